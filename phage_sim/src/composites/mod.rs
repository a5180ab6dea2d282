//! Composers for the two agent kinds of the phage cycle.

mod cell;
mod phage;

pub use cell::{Cell, CellConfig};
pub use phage::{ActivationComposer, Phage, PhageConfig};
