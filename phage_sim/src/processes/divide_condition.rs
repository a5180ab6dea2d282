//! Threshold-triggered division.

use phage_core::{
    Delta, DividerTag, LeafSpec, PortView, PortsSchema, Process, Schema, StepError, Structural,
};
use serde::{Deserialize, Serialize};

/// Division parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivideConditionConfig {
    pub threshold: f64,

    /// Divider declared on the watched variable
    pub variable_divider: Option<DividerTag>,
}

impl Default for DivideConditionConfig {
    fn default() -> Self {
        Self {
            threshold: 20.0,
            variable_divider: Some(DividerTag::Split),
        }
    }
}

/// Divides the agent at its `agent` port once `variable` reaches the
/// threshold.
#[derive(Debug, Clone, Default)]
pub struct DivideCondition {
    config: DivideConditionConfig,
}

impl DivideCondition {
    pub fn new(config: DivideConditionConfig) -> Self {
        Self { config }
    }
}

impl Process for DivideCondition {
    fn name(&self) -> &str {
        "divide_condition"
    }

    fn ports_schema(&self) -> PortsSchema {
        let variable = LeafSpec {
            divider: self.config.variable_divider.clone(),
            ..LeafSpec::untyped()
        };
        PortsSchema::from([
            ("variable".to_string(), Schema::leaf(variable)),
            ("agent".to_string(), Schema::branch()),
        ])
    }

    fn next_update(&self, _timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        if view.number("variable")? >= self.config.threshold {
            return Ok(Delta::new().op("agent", Structural::divide_self()));
        }
        Ok(Delta::new())
    }
}
