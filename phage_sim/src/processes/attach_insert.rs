//! Phage attachment: inserts the phage genome into a host cell.

use phage_core::{
    Composer, Delta, LeafSpec, PortView, PortsSchema, Process, Schema, StepError, Structural,
    UpdaterTag, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Attachment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachInsertConfig {
    /// Genes inserted into the host, by name and length
    pub gene_length: BTreeMap<String, f64>,
    pub gene_activation: f64,
}

impl Default for AttachInsertConfig {
    fn default() -> Self {
        Self {
            gene_length: BTreeMap::from([("phage".to_string(), 20.0)]),
            gene_activation: 1.0,
        }
    }
}

/// Watches the `attach` leaf. When it names a cell, the phage genes and
/// their proteins are added to that cell, the activation composite is
/// generated inside it and `attach` is reset to `false`.
#[derive(Debug, Clone)]
pub struct AttachInsert {
    config: AttachInsertConfig,
    activation: Arc<dyn Composer>,
}

impl AttachInsert {
    pub fn new(config: AttachInsertConfig, activation: Arc<dyn Composer>) -> Self {
        Self { config, activation }
    }
}

impl Process for AttachInsert {
    fn name(&self) -> &str {
        "attach_insert"
    }

    fn ports_schema(&self) -> PortsSchema {
        let cell = Schema::branch_of([("genes", Schema::branch()), ("proteins", Schema::branch())]);
        PortsSchema::from([
            (
                "attach".to_string(),
                Schema::leaf(
                    LeafSpec::default_value(false)
                        .updater(UpdaterTag::Set)
                        .emit(),
                ),
            ),
            ("cells".to_string(), Schema::wildcard(cell)),
        ])
    }

    fn next_update(&self, _timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let cell = match view.value("attach")? {
            Value::Text(cell) => cell.clone(),
            _ => return Ok(Delta::new()),
        };
        if !view.record("cells")?.contains_key(&cell) {
            return Err(StepError::on_port("cells", format!("no cell `{cell}` to attach to")));
        }

        let composite = self
            .activation
            .generate()
            .map_err(|err| StepError::on_port("cells", err.to_string()))?;
        tracing::info!(cell = %cell, "Phage attached");

        let mut delta = Delta::new().value("attach", false);
        for (gene, length) in &self.config.gene_length {
            let state = Value::from_pairs([
                ("activation", self.config.gene_activation),
                ("copy_number", 1.0),
                ("length", *length),
            ]);
            delta = delta
                .op_at("cells", &[cell.as_str(), "genes"], Structural::add(gene.clone(), state))
                .op_at(
                    "cells",
                    &[cell.as_str(), "proteins"],
                    Structural::add(gene.clone(), Value::from_pairs([("count", 0.0)])),
                );
        }
        Ok(delta.op_at("cells", &[cell.as_str()], Structural::generate(None, composite)))
    }
}
