//! Engine errors.
//!
//! Every variant is fatal to the round in which it occurs. The state tree has
//! no rollback, so the engine reports the error upward and stops advancing
//! time.

use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while composing, realizing or updating a simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A required fixed leaf could not be resolved for a process view.
    #[error("missing port `{port}` of {process} at {path}")]
    MissingPort {
        process: String,
        port: String,
        path: String,
    },

    /// A declared port has no usable topology entry.
    #[error("unresolved port `{port}` of {process}: {reason}")]
    UnresolvedPort {
        process: String,
        port: String,
        reason: String,
    },

    /// A process could not operate on the view it was given.
    #[error("process {process} failed{}: {reason}", port_suffix(.port))]
    ProcessStep {
        process: String,
        port: Option<String>,
        reason: String,
    },

    /// Two processes `set` the same leaf in one round.
    #[error("conflicting set on {path}: {first} and {second}")]
    ConflictingUpdate {
        path: String,
        first: String,
        second: String,
    },

    /// A leaf under division names a divider that is not registered.
    #[error("unknown divider `{divider}` on {path}")]
    UnknownDivider { path: String, divider: String },

    /// A leaf names an updater that is not registered.
    #[error("unknown updater `{updater}` on {path}")]
    UnknownUpdater { path: String, updater: String },

    /// Two process names collide while merging or generating composites.
    #[error("process name collision: {name}")]
    NamingCollision { name: String },

    /// A structural instruction targets a missing or contested path.
    #[error("structural target {path}: {reason}")]
    StructuralTarget { path: String, reason: String },

    /// Two schemas disagree about the same location.
    #[error("schema conflict at {path}: {reason}")]
    SchemaConflict { path: String, reason: String },

    /// A value has the wrong kind for the operation applied to it.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// Rounds require a positive, finite timestep.
    #[error("invalid timestep: {0}")]
    InvalidTimestep(f64),

    /// The engine stopped after an earlier failed round.
    #[error("engine halted: {0}")]
    Halted(String),
}

fn port_suffix(port: &Option<String>) -> String {
    port.as_ref()
        .map(|p| format!(" on port `{p}`"))
        .unwrap_or_default()
}

impl EngineError {
    /// Creates a structural target error.
    pub fn structural(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::StructuralTarget {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a schema conflict error.
    pub fn schema(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::SchemaConflict {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn mismatch(
        path: impl std::fmt::Display,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.to_string(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}
