//! Gene expression: genes turn metabolites into proteins.

use super::field;
use phage_core::{
    Delta, DividerTag, LeafSpec, PortView, PortsSchema, Process, Record, Schema, StepError, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Initial state of one gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneSpec {
    pub initial_activation: f64,
    pub initial_copy_number: f64,
    pub length: f64,
}

impl Default for GeneSpec {
    fn default() -> Self {
        Self {
            initial_activation: 1.0,
            initial_copy_number: 1.0,
            length: 20.0,
        }
    }
}

/// Initial state of one protein.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProteinSpec {
    pub initial_count: f64,
    pub metabolite_cost: f64,
    /// Molecular weight (fg)
    pub mw: f64,
}

impl Default for ProteinSpec {
    fn default() -> Self {
        Self {
            initial_count: 10.0,
            metabolite_cost: 1.0,
            mw: 1.0,
        }
    }
}

/// Expression parameters and the genes/proteins seeded into a new cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    pub expression_rate: f64,
    pub genes: BTreeMap<String, GeneSpec>,
    pub proteins: BTreeMap<String, ProteinSpec>,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            expression_rate: 0.1,
            genes: BTreeMap::from([("growth".to_string(), GeneSpec::default())]),
            proteins: BTreeMap::from([("growth".to_string(), ProteinSpec::default())]),
        }
    }
}

/// Each gene produces `rate * metabolites * dt * activation * copy_number`
/// of its protein and consumes `created * metabolite_cost` metabolites.
#[derive(Debug, Clone, Default)]
pub struct Expression {
    config: ExpressionConfig,
}

impl Expression {
    pub fn new(config: ExpressionConfig) -> Self {
        Self { config }
    }
}

impl Process for Expression {
    fn name(&self) -> &str {
        "expression"
    }

    fn ports_schema(&self) -> PortsSchema {
        let gene = Schema::branch_of([
            ("activation", Schema::leaf(LeafSpec::default_value(0.0))),
            ("copy_number", Schema::leaf(LeafSpec::default_value(1.0).emit())),
            ("length", Schema::leaf(LeafSpec::default_value(0.0))),
        ]);
        let protein = Schema::branch_of([
            (
                "count",
                Schema::leaf(
                    LeafSpec::default_value(0.0)
                        .emit()
                        .divider(DividerTag::Split),
                ),
            ),
            ("metabolite_cost", Schema::leaf(LeafSpec::default_value(1.0))),
            ("mw", Schema::leaf(LeafSpec::default_value(1.0))),
        ]);
        PortsSchema::from([
            ("metabolites".to_string(), Schema::untyped()),
            ("genes".to_string(), Schema::wildcard(gene)),
            ("proteins".to_string(), Schema::wildcard(protein)),
        ])
    }

    fn initial_state(&self) -> Value {
        let genes: Record = self
            .config
            .genes
            .iter()
            .map(|(name, spec)| {
                let state = Value::from_pairs([
                    ("activation", spec.initial_activation),
                    ("copy_number", spec.initial_copy_number),
                    ("length", spec.length),
                ]);
                (name.clone(), state)
            })
            .collect();
        let proteins: Record = self
            .config
            .proteins
            .iter()
            .map(|(name, spec)| {
                let state = Value::from_pairs([
                    ("count", spec.initial_count),
                    ("metabolite_cost", spec.metabolite_cost),
                    ("mw", spec.mw),
                ]);
                (name.clone(), state)
            })
            .collect();
        Value::from_pairs([("genes", Value::from(genes)), ("proteins", Value::from(proteins))])
    }

    fn next_update(&self, timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let metabolites = view.number("metabolites")?;
        let genes = view.record("genes")?;
        let proteins = view.record("proteins")?;

        let mut delta = Delta::new();
        let mut metabolites_used = 0.0;
        for (gene, state) in &genes {
            let protein = proteins.get(gene).ok_or_else(|| {
                StepError::on_port("proteins", format!("no protein for gene `{gene}`"))
            })?;
            let created = self.config.expression_rate
                * metabolites
                * timestep
                * field(state, "activation")
                * field(state, "copy_number");
            metabolites_used += created * field(protein, "metabolite_cost");
            delta = delta.nested("proteins", &[gene.as_str(), "count"], created);
        }
        Ok(delta.value("metabolites", -metabolites_used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use phage_core::Update;

    fn view(genes: Value, proteins: Value) -> PortView {
        PortView::from_pairs([
            ("metabolites", Value::from(10.0)),
            ("genes", genes),
            ("proteins", proteins),
        ])
    }

    #[test]
    fn test_expression_creates_protein_and_consumes_metabolites() {
        let expression = Expression::default();
        let genes = Value::from_pairs([(
            "growth",
            Value::from_pairs([("activation", 1.0), ("copy_number", 2.0)]),
        )]);
        let proteins = Value::from_pairs([(
            "growth",
            Value::from_pairs([("count", 0.0), ("metabolite_cost", 0.5)]),
        )]);

        let delta = expression.next_update(1.0, &view(genes, proteins)).unwrap();

        let Some(Update::Value(Value::Number(used))) = delta.get("metabolites") else {
            panic!("expected metabolite delta");
        };
        // created = 0.1 * 10 * 1 * 1 * 2 = 2; used = 2 * 0.5
        assert_relative_eq!(*used, -1.0);
    }

    #[test]
    fn test_gene_without_protein_fails() {
        let expression = Expression::default();
        let genes = Value::from_pairs([("phage", Value::from_pairs([("activation", 1.0)]))]);
        let err = expression
            .next_update(1.0, &view(genes, Value::record()))
            .unwrap_err();
        assert_eq!(err.port.as_deref(), Some("proteins"));
    }

    #[test]
    fn test_initial_state_from_config() {
        let state = Expression::default().initial_state();
        assert_eq!(
            state.get_path(&["proteins", "growth", "count"]),
            Some(&Value::from(10.0))
        );
        assert_eq!(
            state.get_path(&["genes", "growth", "length"]),
            Some(&Value::from(20.0))
        );
    }
}
