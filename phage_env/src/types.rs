//! Common types for the phage-cycle environment boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a spawned agent (a cell or a phage).
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Creates a new random AgentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AgentId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns the short form used as a tree key.
    pub fn key(&self) -> String {
        self.0.simple().to_string()[..12].to_string()
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// One observation of an `emit`-flagged leaf.
///
/// The engine guarantees records reflect the tree after all merges and
/// structural operations of the round, never an intermediate snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitRecord {
    /// Simulation time at the end of the round
    pub time: f64,

    /// Absolute path of the leaf
    pub path: Vec<String>,

    /// Leaf value after the round
    pub value: serde_json::Value,
}

impl EmitRecord {
    /// Creates a new record.
    pub fn new(time: f64, path: Vec<String>, value: serde_json::Value) -> Self {
        Self { time, path, value }
    }

    /// Returns the path joined with `/`.
    pub fn path_key(&self) -> String {
        self.path.join("/")
    }
}
