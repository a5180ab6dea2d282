//! Reference process library for the phage-cycle model.
//!
//! Formulas follow the published model as-is; they are domain policy, not
//! engine behavior.

mod activation;
mod attach_insert;
mod divide_condition;
mod expression;
mod growth;
mod replication;
mod timeline;
mod total_biomass;

pub use activation::{Activation, ActivationConfig};
pub use attach_insert::{AttachInsert, AttachInsertConfig};
pub use divide_condition::{DivideCondition, DivideConditionConfig};
pub use expression::{Expression, ExpressionConfig, GeneSpec, ProteinSpec};
pub use growth::{Growth, GrowthConfig};
pub use replication::{Replication, ReplicationConfig};
pub use timeline::{Timeline, TimelineConfig, TimelineEvent};
pub use total_biomass::{TotalBiomass, TotalBiomassConfig};

use phage_core::Value;

/// Reads a numeric field of a record entry; missing or null reads as zero.
pub(crate) fn field(entry: &Value, key: &str) -> f64 {
    entry
        .get(key)
        .and_then(Value::number_or_zero)
        .unwrap_or(0.0)
}
