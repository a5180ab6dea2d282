//! Derives total biomass from the cell's constituents.

use super::field;
use phage_core::{Delta, LeafSpec, PortView, PortsSchema, Process, Schema, StepError, UpdaterTag};
use serde::{Deserialize, Serialize};

/// Avogadro's number (1/mol).
pub const AVOGADRO: f64 = 6.022_140_76e23;

/// Mass conversion factors (fg).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalBiomassConfig {
    pub metabolite_mass: f64,
    pub gene_mass: f64,
}

impl Default for TotalBiomassConfig {
    fn default() -> Self {
        Self {
            metabolite_mass: 1.0,
            gene_mass: 1.0,
        }
    }
}

/// Sets `biomass` to the summed mass of metabolites, partially replicated
/// DNA, proteins and genes.
#[derive(Debug, Clone, Default)]
pub struct TotalBiomass {
    config: TotalBiomassConfig,
}

impl TotalBiomass {
    pub fn new(config: TotalBiomassConfig) -> Self {
        Self { config }
    }
}

impl Process for TotalBiomass {
    fn name(&self) -> &str {
        "total_biomass"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            (
                "biomass".to_string(),
                Schema::leaf(LeafSpec::default_value(0.0).updater(UpdaterTag::Set)),
            ),
            ("metabolites".to_string(), Schema::untyped()),
            ("incomplete_replication".to_string(), Schema::untyped()),
            (
                "genes".to_string(),
                Schema::wildcard(Schema::branch_of([
                    ("copy_number", Schema::untyped()),
                    ("length", Schema::untyped()),
                ])),
            ),
            (
                "proteins".to_string(),
                Schema::wildcard(Schema::branch_of([
                    ("count", Schema::untyped()),
                    ("mw", Schema::untyped()),
                ])),
            ),
        ])
    }

    fn next_update(&self, _timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let config = &self.config;
        let mut mass = view.number("metabolites")? * config.metabolite_mass;
        mass += view.number("incomplete_replication")? * config.gene_mass;
        for protein in view.record("proteins")?.values() {
            mass += field(protein, "count") * field(protein, "mw") / AVOGADRO;
        }
        for gene in view.record("genes")?.values() {
            mass += field(gene, "copy_number") * field(gene, "length") * config.gene_mass;
        }
        Ok(Delta::new().value("biomass", mass))
    }
}
