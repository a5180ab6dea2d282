//! Phage-cycle Experiments
//!
//! The driver layer on top of `phage_core`:
//! - **Processes**: the reference process library of the phage-cycle model
//!   (growth, expression, replication, mass, division, timeline, attachment
//!   and phage activation)
//! - **Composers**: [`Cell`] and [`Phage`] bundle those processes with their
//!   wiring
//! - **Experiments**: [`Experiment`] wraps an engine with a recording
//!   emitter; [`ScenarioRunner`] runs and checks named scenarios
//!
//! # Tree layout
//!
//! ```text
//! cells/
//!   cell_0/
//!     biomass, metabolites
//!     dna/{incomplete_replication, polymerase_position}
//!     genes/<gene>/{activation, copy_number, length}
//!     proteins/<protein>/{count, metabolite_cost, mw}
//!     phages/<id>/attach          (assembled phages)
//! phages/
//!   phage_0/attach                (free phages)
//! global/time                     (timeline clock)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use phage_sim::{Experiment, ExperimentConfig};
//!
//! let config = ExperimentConfig::default();
//! let mut experiment = Experiment::new(config.cycle_composite()?, &config)?;
//! experiment.update(config.total_time)?;
//! let cells = experiment.agents("cells");
//! ```

pub mod composites;
mod error;
mod experiment;
pub mod processes;
mod runner;
pub mod scenarios;

pub use composites::{Cell, CellConfig, Phage, PhageConfig};
pub use error::SimError;
pub use experiment::{Experiment, ExperimentConfig, CELLS, PHAGES};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
