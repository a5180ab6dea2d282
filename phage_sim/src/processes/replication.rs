//! DNA replication by a single polymerase walking the genome.

use super::field;
use phage_core::{
    Delta, DividerTag, LeafSpec, PortView, PortsSchema, Process, Schema, StepError, UpdaterTag,
    Value,
};
use serde::{Deserialize, Serialize};

/// Replication parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Base pairs per second
    pub elongation_rate: f64,
    pub nucleotide_metabolite_cost: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            elongation_rate: 3.0,
            nucleotide_metabolite_cost: 0.01,
        }
    }
}

/// Moves the polymerase along the genes in key order, doubling the copy
/// number of every gene it finishes this step.
///
/// `incomplete_replication` tracks the partially copied length. The
/// polymerase position wraps once it passes the end of the genome.
#[derive(Debug, Clone, Default)]
pub struct Replication {
    config: ReplicationConfig,
}

impl Replication {
    pub fn new(config: ReplicationConfig) -> Self {
        Self { config }
    }
}

impl Process for Replication {
    fn name(&self) -> &str {
        "replication"
    }

    fn ports_schema(&self) -> PortsSchema {
        let gene = Schema::branch_of([
            ("activation", Schema::leaf(LeafSpec::default_value(0.0))),
            (
                "copy_number",
                Schema::leaf(LeafSpec::default_value(1.0).divider(DividerTag::Split)),
            ),
            ("length", Schema::leaf(LeafSpec::default_value(100.0))),
        ]);
        PortsSchema::from([
            (
                "incomplete_replication".to_string(),
                Schema::leaf(
                    LeafSpec::default_value(0.0)
                        .updater(UpdaterTag::Set)
                        .emit(),
                ),
            ),
            (
                "dna_polymerase_position".to_string(),
                Schema::leaf(LeafSpec::default_value(0.0).emit()),
            ),
            ("metabolites".to_string(), Schema::untyped()),
            ("genes".to_string(), Schema::wildcard(gene)),
        ])
    }

    fn initial_state(&self) -> Value {
        Value::from_pairs([
            ("dna_polymerase_position", 0.0),
            ("incomplete_replication", 0.0),
        ])
    }

    fn next_update(&self, timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let genes = view.record("genes")?;
        let first = genes
            .values()
            .next()
            .ok_or_else(|| StepError::on_port("genes", "no genes to replicate"))?;

        let position = view.number("dna_polymerase_position")?;
        let position_delta = self.config.elongation_rate * timestep;
        let new_position = position + position_delta;
        let metabolites_used = position_delta * self.config.nucleotide_metabolite_cost;

        let mut delta = Delta::new().value("metabolites", -metabolites_used);
        let mut cursor = 0.0;
        let mut incomplete = new_position * field(first, "copy_number");
        for (key, gene) in &genes {
            let mut copy_number = field(gene, "copy_number");
            cursor += field(gene, "length");

            if position < cursor && cursor <= new_position {
                delta = delta.nested("genes", &[key.as_str(), "copy_number"], copy_number);
                copy_number += copy_number;
            }
            // Uses the doubled copy number for genes finished this step.
            if new_position >= cursor {
                incomplete = (new_position - cursor) * copy_number;
            }
        }

        let position_update = if new_position >= cursor {
            position_delta - cursor
        } else {
            position_delta
        };
        Ok(delta
            .value("dna_polymerase_position", position_update)
            .value("incomplete_replication", incomplete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use phage_core::Update;

    fn number(delta: &Delta, port: &str) -> f64 {
        match delta.get(port) {
            Some(Update::Value(Value::Number(v))) => *v,
            other => panic!("expected number on {port}, got {other:?}"),
        }
    }

    fn genes() -> Value {
        Value::from_pairs([
            ("a", Value::from_pairs([("copy_number", 1.0), ("length", 5.0)])),
            ("b", Value::from_pairs([("copy_number", 1.0), ("length", 20.0)])),
        ])
    }

    #[test]
    fn test_polymerase_doubles_finished_gene() {
        let replication = Replication::default();
        let view = PortView::from_pairs([
            ("genes", genes()),
            ("dna_polymerase_position", Value::from(3.0)),
            ("metabolites", Value::from(10.0)),
            ("incomplete_replication", Value::from(0.0)),
        ]);
        // moves 3 -> 6, passing the end of `a` at 5
        let delta = replication.next_update(1.0, &view).unwrap();

        let Some(Update::Branch(genes)) = delta.get("genes") else {
            panic!("expected gene updates");
        };
        assert!(genes.children.contains_key("a"));
        assert!(!genes.children.contains_key("b"));
        assert_relative_eq!(number(&delta, "metabolites"), -0.03, epsilon = 1e-12);
        assert_relative_eq!(number(&delta, "dna_polymerase_position"), 3.0);
        // 1 bp past `a`, which now has two copies
        assert_relative_eq!(number(&delta, "incomplete_replication"), 2.0);
    }

    #[test]
    fn test_position_wraps_at_genome_end() {
        let replication = Replication::default();
        let view = PortView::from_pairs([
            ("genes", genes()),
            ("dna_polymerase_position", Value::from(24.0)),
            ("metabolites", Value::from(10.0)),
        ]);
        let delta = replication.next_update(1.0, &view).unwrap();
        // 24 + 3 passes the genome end at 25; the position delta is 3 - 25.
        assert_relative_eq!(number(&delta, "dna_polymerase_position"), -22.0);
    }

    #[test]
    fn test_no_genes_fails() {
        let replication = Replication::default();
        let view = PortView::from_pairs([
            ("genes", Value::record()),
            ("dna_polymerase_position", Value::from(0.0)),
            ("metabolites", Value::from(10.0)),
        ]);
        let err = replication.next_update(1.0, &view).unwrap_err();
        assert_eq!(err.port.as_deref(), Some("genes"));
    }
}
