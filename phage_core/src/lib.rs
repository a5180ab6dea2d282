//! Phage Core - Composition-and-Update Engine
//!
//! This library drives independently authored processes over a shared,
//! hierarchical state tree:
//! 1. **Composition**: processes declare the shape of state they need
//!    ([`Schema`]) and are wired to tree locations by a [`Topology`]. Bundles
//!    of processes, wiring and initial state form a [`Composite`].
//! 2. **Update**: the [`Engine`] runs synchronous rounds. Every process reads
//!    the same pre-round snapshot; deltas merge through per-leaf updaters.
//! 3. **Restructuring**: a delta may carry [`Structural`] instructions that
//!    add children, generate new composites, divide agents or remove subtrees.
//!
//! # Example
//!
//! ```ignore
//! use phage_core::{Composite, Engine, Path};
//!
//! let mut engine = Engine::new(Composite::from_process(growth))?;
//! engine.advance(10.0)?;
//! let biomass = engine.read(&Path::from("biomass"));
//! ```

pub mod composite;
pub mod divider;
pub mod engine;
pub mod error;
pub mod path;
pub mod process;
pub mod schema;
pub mod topology;
pub mod tree;
pub mod updater;
pub mod value;

// Re-export key types for convenience
pub use composite::{Composer, Composite, FnComposer, Placement};
pub use divider::{DividerFn, DividerRegistry};
pub use engine::{Engine, EngineBuilder, EngineConfig, RoundReport, SetConflictPolicy};
pub use error::{EngineError, Result};
pub use path::Path;
pub use process::{Delta, Process, StepError, Structural, Update, UpdateBranch};
pub use schema::{LeafSpec, PortView, PortsSchema, Schema};
pub use topology::Topology;
pub use tree::{DividerTag, Leaf, Node, StateTree, UpdaterTag};
pub use updater::{UpdaterFn, UpdaterRegistry};
pub use value::{Record, Value};
