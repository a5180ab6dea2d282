//! Wiring from a process's port names to locations in the state tree.

use crate::error::{EngineError, Result};
use crate::path::Path;
use crate::schema::PortsSchema;
use std::collections::BTreeMap;

/// Port name -> path relative to the process's attachment node.
///
/// Relative segments may contain `..`; an empty path denotes the attachment
/// node itself. The same topology wired at two different attachment points
/// addresses two independent regions of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    ports: BTreeMap<String, Vec<String>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires each declared port to a child of the same name.
    pub fn identity(schema: &PortsSchema) -> Self {
        Self {
            ports: schema
                .keys()
                .map(|port| (port.clone(), vec![port.clone()]))
                .collect(),
        }
    }

    /// Builder form of [`Topology::insert`].
    pub fn with<S: AsRef<str>>(mut self, port: impl Into<String>, path: &[S]) -> Self {
        self.insert(port, path);
        self
    }

    pub fn insert<S: AsRef<str>>(&mut self, port: impl Into<String>, path: &[S]) {
        self.ports.insert(
            port.into(),
            path.iter().map(|s| s.as_ref().to_string()).collect(),
        );
    }

    pub fn get(&self, port: &str) -> Option<&[String]> {
        self.ports.get(port).map(Vec::as_slice)
    }

    pub fn ports(&self) -> impl Iterator<Item = &String> {
        self.ports.keys()
    }

    /// Resolves `port` against `base`.
    pub fn resolve(&self, process: &str, port: &str, base: &Path) -> Result<Path> {
        let relative = self.ports.get(port).ok_or_else(|| EngineError::UnresolvedPort {
            process: process.to_string(),
            port: port.to_string(),
            reason: "no topology entry".to_string(),
        })?;
        base.resolve(relative).ok_or_else(|| EngineError::UnresolvedPort {
            process: process.to_string(),
            port: port.to_string(),
            reason: format!("{} walks above the root from {base}", relative.join("/")),
        })
    }

    /// Resolves every port declared by `schema` against `base`.
    pub fn resolve_all(
        &self,
        process: &str,
        schema: &PortsSchema,
        base: &Path,
    ) -> Result<BTreeMap<String, Path>> {
        schema
            .keys()
            .map(|port| Ok((port.clone(), self.resolve(process, port, base)?)))
            .collect()
    }
}
