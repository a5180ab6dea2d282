//! The host cell: growth, expression, replication, mass and division.

use crate::processes::{
    DivideCondition, DivideConditionConfig, Expression, ExpressionConfig, Growth, GrowthConfig,
    Replication, ReplicationConfig, TotalBiomass, TotalBiomassConfig,
};
use phage_core::{Composer, Composite, Result, Topology};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-process parameters of a cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    pub growth: GrowthConfig,
    pub expression: ExpressionConfig,
    pub replication: ReplicationConfig,
    pub total_biomass: TotalBiomassConfig,
    pub divide_condition: DivideConditionConfig,
}

/// Builds a cell rooted at the composite root; nest it under
/// `cells/<id>` to place it.
///
/// Replication state lives under `dna/`; division watches `biomass` and
/// divides the cell node itself.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    config: CellConfig,
}

impl Cell {
    pub fn new(config: CellConfig) -> Self {
        Self { config }
    }

    pub fn shared(config: CellConfig) -> Arc<dyn Composer> {
        Arc::new(Self::new(config))
    }
}

impl Composer for Cell {
    fn name(&self) -> &str {
        "cell"
    }

    fn generate(&self) -> Result<Composite> {
        let config = &self.config;
        let dna_incomplete = ["dna", "incomplete_replication"];

        Composite::new()
            .with_process(
                "growth",
                Arc::new(Growth::new(config.growth.clone())),
                Topology::new()
                    .with("biomass", &["biomass"])
                    .with("metabolites", &["metabolites"]),
            )?
            .with_process(
                "expression",
                Arc::new(Expression::new(config.expression.clone())),
                Topology::new()
                    .with("metabolites", &["metabolites"])
                    .with("genes", &["genes"])
                    .with("proteins", &["proteins"]),
            )?
            .with_process(
                "replication",
                Arc::new(Replication::new(config.replication.clone())),
                Topology::new()
                    .with("metabolites", &["metabolites"])
                    .with("genes", &["genes"])
                    .with("incomplete_replication", &dna_incomplete)
                    .with("dna_polymerase_position", &["dna", "polymerase_position"]),
            )?
            .with_process(
                "total_biomass",
                Arc::new(TotalBiomass::new(config.total_biomass.clone())),
                Topology::new()
                    .with("biomass", &["biomass"])
                    .with("metabolites", &["metabolites"])
                    .with("genes", &["genes"])
                    .with("incomplete_replication", &dna_incomplete)
                    .with("proteins", &["proteins"]),
            )?
            .with_process(
                "divide_condition",
                Arc::new(DivideCondition::new(config.divide_condition.clone())),
                Topology::new()
                    .with("variable", &["biomass"])
                    .with("agent", &[] as &[&str]),
            )
    }
}
