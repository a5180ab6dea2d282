//! Phage activation: turns accumulated phage protein into new phage agents.

use phage_core::{
    Composer, Delta, LeafSpec, PortView, PortsSchema, Process, Schema, StepError, Structural,
};
use phage_env::IdSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Activation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Phage protein count above which a new phage is assembled
    pub threshold: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

/// Assembles one phage under `phages/<id>` once the phage protein count
/// exceeds the threshold, consuming the protein.
#[derive(Debug, Clone)]
pub struct Activation {
    config: ActivationConfig,
    composer: Arc<dyn Composer>,
    ids: Arc<dyn IdSource>,
}

impl Activation {
    pub fn new(config: ActivationConfig, composer: Arc<dyn Composer>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            config,
            composer,
            ids,
        }
    }
}

impl Process for Activation {
    fn name(&self) -> &str {
        "activation"
    }

    fn ports_schema(&self) -> PortsSchema {
        let phage = Schema::branch_of([
            ("count", Schema::leaf(LeafSpec::default_value(0.0))),
            ("metabolite_cost", Schema::leaf(LeafSpec::default_value(1.0))),
        ]);
        PortsSchema::from([
            ("proteins".to_string(), Schema::branch_of([("phage", phage)])),
            ("phages".to_string(), Schema::wildcard(Schema::branch())),
        ])
    }

    fn next_update(&self, _timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let count = view.nested_number("proteins", &["phage", "count"])?;
        if count <= self.config.threshold {
            return Ok(Delta::new());
        }

        let composite = self
            .composer
            .generate()
            .map_err(|err| StepError::on_port("phages", err.to_string()))?;
        let key = self.ids.next_agent_id().key();
        tracing::debug!(phage = %key, count, "Assembling phage");

        Ok(Delta::new()
            .nested("proteins", &["phage", "count"], -count)
            .op("phages", Structural::generate(Some(key), composite)))
    }
}
