//! Composites: bundles of processes, their wiring and initial state.

use crate::error::{EngineError, Result};
use crate::path::Path;
use crate::process::Process;
use crate::topology::Topology;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// A process placed inside a composite.
#[derive(Debug, Clone)]
pub struct Placement {
    pub process: Arc<dyn Process>,
    pub topology: Topology,
}

/// Processes keyed by their path relative to the composite root, plus the
/// initial state they expect.
///
/// A process keyed `growth` is attached at the composite root; one keyed
/// `cells/cell_0/growth` is attached at `cells/cell_0`. Topologies resolve
/// against the attachment node. A composite without state still carries an
/// empty record, so nesting it yields branches rather than leaves.
#[derive(Debug, Clone)]
pub struct Composite {
    processes: IndexMap<Path, Placement>,
    initial_state: Value,
}

impl Default for Composite {
    fn default() -> Self {
        Self {
            processes: IndexMap::new(),
            initial_state: Value::record(),
        }
    }
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a single process with an identity topology.
    pub fn from_process(process: Arc<dyn Process>) -> Self {
        let topology = Topology::identity(&process.ports_schema());
        let key = Path::new([process.name().to_string()]);
        let mut composite = Self::new();
        composite.seed_state(&key, &process, &topology);
        composite.processes.insert(key, Placement { process, topology });
        composite
    }

    /// Adds a process under `key`.
    ///
    /// The process's own initial state is routed through `topology` and
    /// seeded wherever the composite has no value yet.
    pub fn with_process(
        mut self,
        key: impl Into<Path>,
        process: Arc<dyn Process>,
        topology: Topology,
    ) -> Result<Self> {
        self.insert(key.into(), Placement { process, topology })?;
        Ok(self)
    }

    /// Deep-merges `state` over the initial state.
    pub fn with_state(mut self, state: Value) -> Self {
        self.initial_state.merge_over(&state);
        self
    }

    fn insert(&mut self, key: Path, placement: Placement) -> Result<()> {
        if self.processes.contains_key(&key) {
            return Err(EngineError::NamingCollision {
                name: key.to_string(),
            });
        }
        self.seed_state(&key, &placement.process, &placement.topology);
        self.processes.insert(key, placement);
        Ok(())
    }

    fn seed_state(&mut self, key: &Path, process: &Arc<dyn Process>, topology: &Topology) {
        let Value::Record(ports) = process.initial_state() else {
            return;
        };
        let base = key.parent().unwrap_or_default();
        for (port, value) in ports {
            // Ports wired outside the composite root are left to their owners.
            let Some(path) = topology.get(&port).and_then(|relative| base.resolve(relative)) else {
                continue;
            };
            let nested = path
                .segments()
                .iter()
                .rev()
                .fold(value, |state, seg| Value::from_pairs([(seg.clone(), state)]));
            self.initial_state.merge_missing(&nested);
        }
    }

    /// Moves everything under `at`: process keys gain the prefix and the
    /// initial state is nested beneath it.
    pub fn nest(self, at: &Path) -> Self {
        let processes = self
            .processes
            .into_iter()
            .map(|(key, placement)| (at.join(&key), placement))
            .collect();
        let initial_state = at
            .segments()
            .iter()
            .rev()
            .fold(self.initial_state, |state, seg| {
                Value::from_pairs([(seg.clone(), state)])
            });
        Self {
            processes,
            initial_state,
        }
    }

    /// Unions another composite into this one.
    ///
    /// Process keys must be disjoint; initial states are deep-merged with
    /// `other` taking precedence.
    pub fn merge(&mut self, other: Composite) -> Result<()> {
        if let Some(key) = other.processes.keys().find(|k| self.processes.contains_key(*k)) {
            return Err(EngineError::NamingCollision {
                name: key.to_string(),
            });
        }
        self.processes.extend(other.processes);
        self.initial_state.merge_over(&other.initial_state);
        Ok(())
    }

    pub fn processes(&self) -> impl Iterator<Item = (&Path, &Placement)> {
        self.processes.iter()
    }

    pub fn initial_state(&self) -> &Value {
        &self.initial_state
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// A factory for fresh composites.
///
/// Processes that spawn agents carry an `Arc<dyn Composer>` in their
/// configuration instead of a reference to a concrete composite type.
pub trait Composer: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn generate(&self) -> Result<Composite>;
}

/// A composer backed by a closure.
pub struct FnComposer<F> {
    name: String,
    build: F,
}

impl<F> FnComposer<F>
where
    F: Fn() -> Result<Composite> + Send + Sync + 'static,
{
    pub fn shared(name: impl Into<String>, build: F) -> Arc<dyn Composer> {
        Arc::new(Self {
            name: name.into(),
            build,
        })
    }
}

impl<F> std::fmt::Debug for FnComposer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnComposer").field("name", &self.name).finish()
    }
}

impl<F> Composer for FnComposer<F>
where
    F: Fn() -> Result<Composite> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self) -> Result<Composite> {
        (self.build)()
    }
}
