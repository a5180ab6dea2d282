//! The phage: an attachment process that later seeds activation in its host.

use crate::processes::{Activation, ActivationConfig, AttachInsert, AttachInsertConfig};
use phage_core::{Composer, Composite, Result, Topology};
use phage_env::IdSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Phage parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhageConfig {
    /// Cell collection relative to the phage node
    pub cells_path: Vec<String>,
    pub attach: AttachInsertConfig,
    pub activation: ActivationConfig,
}

impl Default for PhageConfig {
    fn default() -> Self {
        Self {
            cells_path: vec!["..".into(), "..".into(), "cells".into()],
            attach: AttachInsertConfig::default(),
            activation: ActivationConfig::default(),
        }
    }
}

/// Builds a free phage. Its `attachment` process watches `attach` and
/// reaches the host collection through `cells_path`.
#[derive(Debug, Clone)]
pub struct Phage {
    config: PhageConfig,
    ids: Arc<dyn IdSource>,
}

impl Phage {
    pub fn new(config: PhageConfig, ids: Arc<dyn IdSource>) -> Self {
        Self { config, ids }
    }

    pub fn shared(config: PhageConfig, ids: Arc<dyn IdSource>) -> Arc<dyn Composer> {
        Arc::new(Self::new(config, ids))
    }
}

impl Composer for Phage {
    fn name(&self) -> &str {
        "phage"
    }

    fn generate(&self) -> Result<Composite> {
        let activation = ActivationComposer::shared(self.config.clone(), Arc::clone(&self.ids));
        Composite::new().with_process(
            "attachment",
            Arc::new(AttachInsert::new(self.config.attach.clone(), activation)),
            Topology::new()
                .with("attach", &["attach"])
                .with("cells", self.config.cells_path.as_slice()),
        )
    }
}

/// Builds the activation process generated into an infected cell.
///
/// Phages it assembles live at `cells/<cell>/phages/<id>`, so their cell
/// collection is three levels up.
#[derive(Debug, Clone)]
pub struct ActivationComposer {
    phage: PhageConfig,
    ids: Arc<dyn IdSource>,
}

impl ActivationComposer {
    pub fn shared(phage: PhageConfig, ids: Arc<dyn IdSource>) -> Arc<dyn Composer> {
        Arc::new(Self { phage, ids })
    }
}

impl Composer for ActivationComposer {
    fn name(&self) -> &str {
        "activation"
    }

    fn generate(&self) -> Result<Composite> {
        let progeny = PhageConfig {
            cells_path: vec!["..".into(), "..".into(), "..".into()],
            ..self.phage.clone()
        };
        let process = Activation::new(
            self.phage.activation.clone(),
            Phage::shared(progeny, Arc::clone(&self.ids)),
            Arc::clone(&self.ids),
        );
        Composite::new().with_process(
            "activation",
            Arc::new(process),
            Topology::new()
                .with("proteins", &["proteins"])
                .with("phages", &["phages"]),
        )
    }
}
