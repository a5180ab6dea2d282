//! Phage-cycle Environment Boundary
//!
//! This crate holds the collaborators the update engine talks to but does not
//! own:
//! - **Observation**: every `emit`-flagged leaf is reported to an [`Emitter`]
//!   as `(time, path, value)` records after each round.
//! - **Identity**: processes that spawn new agents draw their keys from an
//!   [`IdSource`], so a run is reproducible from a single 64-bit seed.
//!
//! # Implementations
//!
//! | Concern  | Production      | Reproducible run  |
//! |----------|-----------------|-------------------|
//! | Emitter  | `LogEmitter`    | `RamEmitter`      |
//! | Ids      | `RandomIds`     | `SeededIds`       |
//!
//! # Example
//!
//! ```ignore
//! use phage_env::{Emitter, RamEmitter, EmitRecord};
//!
//! let emitter = RamEmitter::shared();
//! emitter.emit(EmitRecord::new(0.0, vec!["biomass".into()], 1.0.into()));
//! assert_eq!(emitter.timeseries()["biomass"].len(), 1);
//! ```

mod emitter;
mod ids;
mod types;

pub use emitter::{Emitter, LogEmitter, NullEmitter, RamEmitter, Timeseries};
pub use ids::{IdSource, RandomIds, SeededIds};
pub use types::{AgentId, EmitRecord};
