//! Driver-level errors.

use phage_core::EngineError;
use thiserror::Error;

/// Errors raised while configuring or running experiments.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
}
