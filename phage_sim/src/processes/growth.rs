//! Exponential growth of the metabolite pool.

use phage_core::{
    Delta, DividerTag, LeafSpec, PortView, PortsSchema, Process, Schema, StepError, Value,
};
use serde::{Deserialize, Serialize};

/// Growth parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Per-second growth rate
    pub growth_rate: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self { growth_rate: 5e-4 }
    }
}

/// Grows `metabolites` toward `biomass * exp(rate * dt)`.
#[derive(Debug, Clone, Default)]
pub struct Growth {
    config: GrowthConfig,
}

impl Growth {
    pub fn new(config: GrowthConfig) -> Self {
        Self { config }
    }
}

impl Process for Growth {
    fn name(&self) -> &str {
        "growth"
    }

    fn ports_schema(&self) -> PortsSchema {
        let pool = || {
            Schema::leaf(
                LeafSpec::default_value(1.0)
                    .emit()
                    .divider(DividerTag::Split),
            )
        };
        PortsSchema::from([
            ("metabolites".to_string(), pool()),
            ("biomass".to_string(), pool()),
        ])
    }

    fn initial_state(&self) -> Value {
        Value::from_pairs([("metabolites", 10.0)])
    }

    fn next_update(&self, timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let metabolites = view.number("metabolites")?;
        let biomass = view.number("biomass")?;
        let total = biomass * (self.config.growth_rate * timestep).exp();
        Ok(Delta::new().value("metabolites", total - metabolites))
    }
}
