//! The update engine: drives synchronous rounds over the state tree.
//!
//! # Round phases
//!
//! 1. **Ensure**: every process's schema is ensured against the tree.
//! 2. **Invoke**: each process sees a view of the immutable pre-round tree.
//!    Invocations are independent and run on the rayon pool when
//!    `EngineConfig::parallel` is set.
//! 3. **Merge**: deltas are applied one process at a time in registration
//!    order through each leaf's updater. Structural instructions are queued.
//! 4. **Structural**: queued instructions are applied as
//!    add -> generate -> divide -> remove.
//! 5. **Advance**: the tree is ensured again, `emit` leaves are reported and
//!    the clock moves forward.
//!
//! Any error halts the engine; the clock stays where it was.

use crate::composite::{Composite, Placement};
use crate::divider::{DividerFn, DividerRegistry};
use crate::error::{EngineError, Result};
use crate::path::Path;
use crate::process::{Delta, Process, Structural, Update};
use crate::schema::{PortView, PortsSchema};
use crate::topology::Topology;
use crate::tree::{Node, StateTree, UpdaterTag};
use crate::updater::{UpdaterFn, UpdaterRegistry};
use crate::value::Value;
use indexmap::IndexMap;
use phage_env::{EmitRecord, Emitter, NullEmitter};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace};

/// Relative tolerance when landing the clock on a requested end time.
const TIME_EPSILON: f64 = 1e-9;

fn time_tolerance(end: f64) -> f64 {
    TIME_EPSILON * end.abs().max(1.0)
}

/// What happens when two processes `set` the same leaf in one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetConflictPolicy {
    /// Fail the round with `ConflictingUpdate`.
    #[default]
    Error,
    /// The later-registered process wins.
    LastWins,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timestep used by [`Engine::advance`]
    pub timestep: f64,

    /// Invoke processes on the rayon pool
    pub parallel: bool,

    /// Tie-break for competing `set` writers
    pub set_conflict: SetConflictPolicy,

    /// Emit the initial tree at time 0
    pub emit_initial: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0,
            parallel: true,
            set_conflict: SetConflictPolicy::Error,
            emit_initial: true,
        }
    }
}

/// Summary of one completed round.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoundReport {
    pub round: u64,
    pub time: f64,
    pub processes: usize,
    pub added: usize,
    pub generated: usize,
    pub divided: usize,
    pub removed: usize,
}

/// A process attached at a location in the tree.
#[derive(Debug, Clone)]
struct Registered {
    id: Path,
    base: Path,
    process: Arc<dyn Process>,
    topology: Topology,
    schema: PortsSchema,
    ports: BTreeMap<String, Path>,
}

impl Registered {
    fn new(id: Path, placement: Placement) -> Result<Self> {
        let base = id.parent().unwrap_or_default();
        let schema = placement.process.ports_schema();
        let ports = placement
            .topology
            .resolve_all(&id.to_string(), &schema, &base)?;
        Ok(Self {
            id,
            base,
            process: placement.process,
            topology: placement.topology,
            schema,
            ports,
        })
    }

    /// The same process and relative wiring, moved from one subtree to another.
    fn moved(&self, from: &Path, to: &Path) -> Result<Self> {
        let id = self.id.rebase(from, to).unwrap_or_else(|| self.id.clone());
        Self::new(
            id,
            Placement {
                process: Arc::clone(&self.process),
                topology: self.topology.clone(),
            },
        )
    }

    fn ensure(&self, tree: &mut StateTree) -> Result<()> {
        for (port, schema) in &self.schema {
            if let Some(path) = self.ports.get(port) {
                schema.ensure(tree, path)?;
            }
        }
        Ok(())
    }

    fn view(&self, tree: &StateTree) -> Result<PortView> {
        let mut view = PortView::new();
        for (port, schema) in &self.schema {
            let Some(path) = self.ports.get(port) else {
                continue;
            };
            let missing = |at: Path| EngineError::MissingPort {
                process: self.id.to_string(),
                port: port.clone(),
                path: at.to_string(),
            };
            match schema.realize(tree, path, true) {
                Ok(Some(value)) => view.insert(port.clone(), value),
                Ok(None) => return Err(missing(path.clone())),
                Err(at) => return Err(missing(at)),
            }
        }
        Ok(view)
    }

    fn invoke(&self, tree: &StateTree, timestep: f64) -> Result<Delta> {
        let view = self.view(tree)?;
        self.process
            .next_update(timestep, &view)
            .map_err(|err| EngineError::ProcessStep {
                process: self.id.to_string(),
                port: err.port,
                reason: err.reason,
            })
    }

    fn port_path(&self, port: &str) -> Result<Path> {
        match self.ports.get(port) {
            Some(path) => Ok(path.clone()),
            None => self.topology.resolve(&self.id.to_string(), port, &self.base),
        }
    }
}

/// Structural instructions collected during the merge phase.
#[derive(Debug, Default)]
struct Pending {
    adds: Vec<(Path, String, Value)>,
    generates: Vec<(Path, Composite)>,
    divides: Vec<(Path, Option<[String; 2]>)>,
    removes: Vec<Path>,
}

impl Pending {
    fn push(&mut self, at: &Path, op: Structural) {
        match op {
            Structural::Add { key, state } => self.adds.push((at.clone(), key, state)),
            Structural::Generate { key, composite } => {
                let target = key.map_or_else(|| at.clone(), |k| at.child(k));
                self.generates.push((target, composite));
            }
            Structural::Divide { key, daughters } => {
                let target = key.map_or_else(|| at.clone(), |k| at.child(k));
                self.divides.push((target, daughters));
            }
            Structural::Remove { key } => self.removes.push(at.child(key)),
        }
    }
}

/// The sole mutator of the tree during a round's merge phase.
struct Merger<'a> {
    tree: &'a mut StateTree,
    updaters: &'a UpdaterRegistry,
    policy: SetConflictPolicy,
    setters: HashMap<Path, String>,
    pending: Pending,
}

impl<'a> Merger<'a> {
    fn new(tree: &'a mut StateTree, updaters: &'a UpdaterRegistry, policy: SetConflictPolicy) -> Self {
        Self {
            tree,
            updaters,
            policy,
            setters: HashMap::new(),
            pending: Pending::default(),
        }
    }

    fn merge_delta(&mut self, source: &Registered, delta: Delta) -> Result<()> {
        let name = source.id.to_string();
        for (port, update) in delta.into_ports() {
            let path = source.port_path(&port)?;
            self.apply(&name, path, update)?;
        }
        Ok(())
    }

    fn apply(&mut self, source: &str, path: Path, update: Update) -> Result<()> {
        match update {
            Update::Value(value) => self.apply_value(source, &path, value),
            Update::Branch(branch) => {
                for (key, child) in branch.children {
                    self.apply(source, path.child(key), child)?;
                }
                for op in branch.ops {
                    self.pending.push(&path, op);
                }
                Ok(())
            }
        }
    }

    fn apply_value(&mut self, source: &str, path: &Path, value: Value) -> Result<()> {
        let (tag, current) = match self.tree.node(path) {
            Some(Node::Leaf(leaf)) => (leaf.updater(), leaf.value.clone()),
            Some(Node::Inner(_)) => {
                return match value {
                    Value::Record(record) => {
                        for (key, child) in record {
                            self.apply_value(source, &path.child(key), child)?;
                        }
                        Ok(())
                    }
                    Value::Null => Ok(()),
                    other => Err(EngineError::mismatch(path, "record", other.kind())),
                };
            }
            None => return self.tree.write(path, value),
        };

        if tag == UpdaterTag::Set {
            self.claim_set(source, path)?;
        }
        let next = self.updaters.apply(&tag, path, &current, &value)?;
        if let Some(leaf) = self.tree.leaf_mut(path) {
            leaf.value = next;
        }
        Ok(())
    }

    fn claim_set(&mut self, source: &str, path: &Path) -> Result<()> {
        match self.setters.get(path) {
            Some(first) if first != source && self.policy == SetConflictPolicy::Error => {
                Err(EngineError::ConflictingUpdate {
                    path: path.to_string(),
                    first: first.clone(),
                    second: source.to_string(),
                })
            }
            _ => {
                self.setters.insert(path.clone(), source.to_string());
                Ok(())
            }
        }
    }
}

/// Builder for an [`Engine`].
pub struct EngineBuilder {
    composite: Composite,
    state: Option<Value>,
    config: EngineConfig,
    updaters: UpdaterRegistry,
    dividers: DividerRegistry,
    emitter: Arc<dyn Emitter>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Overlays `state` on the composite's initial state.
    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn updater(mut self, name: impl Into<String>, updater: UpdaterFn) -> Self {
        self.updaters.register(name, updater);
        self
    }

    pub fn divider(mut self, name: impl Into<String>, divider: DividerFn) -> Self {
        self.dividers.register(name, divider);
        self
    }

    /// Builds the tree, registers every process and emits the initial state.
    pub fn build(self) -> Result<Engine> {
        let mut initial = self.composite.initial_state().clone();
        if let Some(state) = &self.state {
            initial.merge_over(state);
        }

        let mut engine = Engine {
            config: self.config,
            tree: StateTree::from_value(&initial),
            processes: IndexMap::new(),
            updaters: self.updaters,
            dividers: self.dividers,
            emitter: self.emitter,
            time: 0.0,
            round: 0,
            halted: None,
        };
        for (key, placement) in self.composite.processes() {
            engine.register(key.clone(), placement.clone())?;
        }
        engine.ensure_all()?;
        engine.check_updaters()?;

        info!(
            "Engine ready: {} processes, {} leaves",
            engine.processes.len(),
            engine.tree.leaves().len()
        );
        if engine.config.emit_initial {
            engine.emit();
        }
        Ok(engine)
    }
}

/// Drives a composite forward in synchronous rounds.
pub struct Engine {
    config: EngineConfig,
    tree: StateTree,
    processes: IndexMap<Path, Registered>,
    updaters: UpdaterRegistry,
    dividers: DividerRegistry,
    emitter: Arc<dyn Emitter>,
    time: f64,
    round: u64,
    halted: Option<String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("time", &self.time)
            .field("round", &self.round)
            .field("processes", &self.process_ids())
            .field("halted", &self.halted)
            .finish()
    }
}

impl Engine {
    /// Starts building an engine around `composite`.
    pub fn builder(composite: Composite) -> EngineBuilder {
        EngineBuilder {
            composite,
            state: None,
            config: EngineConfig::default(),
            updaters: UpdaterRegistry::default(),
            dividers: DividerRegistry::default(),
            emitter: Arc::new(NullEmitter),
        }
    }

    /// Builds an engine with default configuration and no observer.
    pub fn new(composite: Composite) -> Result<Self> {
        Self::builder(composite).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &StateTree {
        &self.tree
    }

    pub fn read(&self, path: &Path) -> Option<Value> {
        self.tree.read(path)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn emitter(&self) -> &Arc<dyn Emitter> {
        &self.emitter
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Identities of all registered processes, in registration order.
    pub fn process_ids(&self) -> Vec<String> {
        self.processes.keys().map(Path::to_string).collect()
    }

    /// Replaces a value from outside the round cycle.
    pub fn write(&mut self, path: &Path, value: Value) -> Result<()> {
        self.check_running()?;
        self.tree.write(path, value)
    }

    /// Attaches a composite at `at` between rounds.
    pub fn add_composite(&mut self, at: &Path, composite: Composite) -> Result<()> {
        self.check_running()?;
        self.generate(at, composite)?;
        self.ensure_all()
    }

    /// Runs one round of `timestep`.
    #[instrument(skip(self), fields(round = self.round, time = self.time))]
    pub fn run_round(&mut self, timestep: f64) -> Result<RoundReport> {
        self.run_round_until(timestep, None)
    }

    /// Runs one round; when the advanced clock falls within tolerance of
    /// `land_at`, the clock lands on it before the round is emitted.
    fn run_round_until(&mut self, timestep: f64, land_at: Option<f64>) -> Result<RoundReport> {
        self.check_running()?;
        if !(timestep.is_finite() && timestep > 0.0) {
            return Err(EngineError::InvalidTimestep(timestep));
        }
        match self.step(timestep, land_at) {
            Ok(report) => Ok(report),
            Err(err) => {
                error!("Round {} failed at t={}: {}", self.round, self.time, err);
                self.halted = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Runs rounds of the configured timestep until `total_time` has
    /// elapsed. The last round is shortened to land exactly on the end time.
    pub fn advance(&mut self, total_time: f64) -> Result<u64> {
        if !(total_time.is_finite() && total_time >= 0.0) {
            return Err(EngineError::InvalidTimestep(total_time));
        }
        let end = self.time + total_time;
        let epsilon = time_tolerance(end);
        let mut rounds = 0;
        while end - self.time > epsilon {
            let timestep = self.config.timestep.min(end - self.time);
            self.run_round_until(timestep, Some(end))?;
            rounds += 1;
        }
        Ok(rounds)
    }

    fn check_running(&self) -> Result<()> {
        match &self.halted {
            Some(reason) => Err(EngineError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn step(&mut self, timestep: f64, land_at: Option<f64>) -> Result<RoundReport> {
        self.ensure_all()?;

        let deltas = self.invoke(timestep)?;
        trace!("Invoked {} processes", deltas.len());

        let pending = {
            let mut merger = Merger::new(&mut self.tree, &self.updaters, self.config.set_conflict);
            for (registered, delta) in self.processes.values().zip(deltas) {
                merger.merge_delta(registered, delta)?;
            }
            merger.pending
        };

        let mut report = self.apply_structural(pending)?;
        self.ensure_all()?;

        let next = self.time + timestep;
        self.time = match land_at {
            Some(end) if (end - next).abs() <= time_tolerance(end) => end,
            _ => next,
        };
        self.round += 1;
        self.emit();

        report.round = self.round;
        report.time = self.time;
        report.processes = self.processes.len();
        trace!("Round complete: {:?}", report);
        Ok(report)
    }

    fn invoke(&self, timestep: f64) -> Result<Vec<Delta>> {
        let tree = &self.tree;
        let registered: Vec<&Registered> = self.processes.values().collect();
        let results: Vec<Result<Delta>> = if self.config.parallel {
            registered
                .par_iter()
                .map(|process| process.invoke(tree, timestep))
                .collect()
        } else {
            registered
                .iter()
                .map(|process| process.invoke(tree, timestep))
                .collect()
        };
        // First failure in registration order wins.
        results.into_iter().collect()
    }

    fn apply_structural(&mut self, pending: Pending) -> Result<RoundReport> {
        let mut report = RoundReport::default();

        let mut targets = HashSet::new();
        for path in pending
            .divides
            .iter()
            .map(|(path, _)| path)
            .chain(pending.removes.iter())
        {
            if !targets.insert(path.clone()) {
                return Err(EngineError::structural(
                    path,
                    "targeted by more than one divide or remove",
                ));
            }
        }

        for (parent, key, state) in pending.adds {
            if !matches!(self.tree.node(&parent), Some(Node::Inner(_))) {
                return Err(EngineError::structural(&parent, "add target is not a branch"));
            }
            self.tree.insert(&parent.child(key), Node::from_value(&state))?;
            report.added += 1;
        }

        for (target, composite) in pending.generates {
            debug!("Generating {} processes at {}", composite.len(), target);
            self.generate(&target, composite)?;
            report.generated += 1;
        }

        for (target, daughters) in pending.divides {
            self.divide(&target, daughters)?;
            report.divided += 1;
        }

        for target in pending.removes {
            debug!("Removing {}", target);
            self.tree.remove(&target)?;
            self.processes.retain(|id, _| !id.starts_with(&target));
            report.removed += 1;
        }

        Ok(report)
    }

    fn generate(&mut self, at: &Path, composite: Composite) -> Result<()> {
        self.tree.fill_missing(at, composite.initial_state())?;
        for (key, placement) in composite.processes() {
            self.register(at.join(key), placement.clone())?;
        }
        Ok(())
    }

    fn divide(&mut self, target: &Path, daughters: Option<[String; 2]>) -> Result<()> {
        let (parent, key) = match (target.parent(), target.key()) {
            (Some(parent), Some(key)) => (parent, key.to_string()),
            _ => return Err(EngineError::structural(target, "cannot divide the root")),
        };
        let mother = match self.tree.node(target) {
            Some(node @ Node::Inner(_)) => node,
            Some(Node::Leaf(_)) => return Err(EngineError::structural(target, "cannot divide a leaf")),
            None => return Err(EngineError::structural(target, "does not exist")),
        };
        let (first, second) = self.dividers.divide_node(mother, target)?;
        self.tree.remove(target)?;

        let [a, b] = match daughters {
            Some(keys) => keys,
            None => self.daughter_keys(&parent, &key),
        };
        let daughters = [parent.child(a), parent.child(b)];
        self.tree.insert(&daughters[0], first)?;
        self.tree.insert(&daughters[1], second)?;
        debug!("Divided {} into {} and {}", target, daughters[0], daughters[1]);

        let processes = std::mem::take(&mut self.processes);
        for (id, registered) in processes {
            if id.starts_with(target) {
                for daughter in &daughters {
                    let moved = registered.moved(target, daughter)?;
                    self.insert_registered(moved)?;
                }
            } else {
                self.processes.insert(id, registered);
            }
        }
        Ok(())
    }

    /// Two fresh sibling keys `{key}_{n}` using the smallest free `n`.
    fn daughter_keys(&self, parent: &Path, key: &str) -> [String; 2] {
        let taken: HashSet<String> = self.tree.child_keys(parent).into_iter().collect();
        let mut free = (0..)
            .map(|n| format!("{key}_{n}"))
            .filter(|candidate| !taken.contains(candidate));
        let first = free.next().unwrap_or_default();
        let second = free.next().unwrap_or_default();
        [first, second]
    }

    fn register(&mut self, id: Path, placement: Placement) -> Result<()> {
        let registered = Registered::new(id, placement)?;
        self.insert_registered(registered)
    }

    fn insert_registered(&mut self, registered: Registered) -> Result<()> {
        if self.processes.contains_key(&registered.id) {
            return Err(EngineError::NamingCollision {
                name: registered.id.to_string(),
            });
        }
        self.processes.insert(registered.id.clone(), registered);
        Ok(())
    }

    fn ensure_all(&mut self) -> Result<()> {
        for registered in self.processes.values() {
            registered.ensure(&mut self.tree)?;
        }
        Ok(())
    }

    fn check_updaters(&self) -> Result<()> {
        for (path, leaf) in self.tree.leaves() {
            if let Some(tag) = &leaf.updater {
                if !self.updaters.contains(tag) {
                    return Err(EngineError::UnknownUpdater {
                        path: path.to_string(),
                        updater: tag.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn emit(&self) {
        let records: Vec<EmitRecord> = self
            .tree
            .emitted()
            .into_iter()
            .map(|(path, leaf)| {
                EmitRecord::new(
                    self.time,
                    path.segments().to_vec(),
                    serde_json::Value::from(&leaf.value),
                )
            })
            .collect();
        if !records.is_empty() {
            self.emitter.emit_all(records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::StepError;
    use crate::schema::{LeafSpec, Schema};
    use crate::tree::DividerTag;
    use phage_env::RamEmitter;

    /// Adds `amount` to its `x` port each round.
    #[derive(Debug)]
    struct Adder {
        name: &'static str,
        amount: f64,
    }

    impl Process for Adder {
        fn name(&self) -> &str {
            self.name
        }

        fn ports_schema(&self) -> PortsSchema {
            PortsSchema::from([(
                "x".to_string(),
                Schema::leaf(LeafSpec::default_value(0.0).emit().divider(DividerTag::Split)),
            )])
        }

        fn next_update(&self, timestep: f64, _view: &PortView) -> std::result::Result<Delta, StepError> {
            Ok(Delta::new().value("x", self.amount * timestep))
        }
    }

    /// Sets its `x` port to a constant.
    #[derive(Debug)]
    struct Setter {
        name: &'static str,
        value: f64,
    }

    impl Process for Setter {
        fn name(&self) -> &str {
            self.name
        }

        fn ports_schema(&self) -> PortsSchema {
            PortsSchema::from([(
                "x".to_string(),
                Schema::leaf(LeafSpec::default_value(0.0).updater(UpdaterTag::Set)),
            )])
        }

        fn next_update(&self, _timestep: f64, _view: &PortView) -> std::result::Result<Delta, StepError> {
            Ok(Delta::new().value("x", self.value))
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Process for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn ports_schema(&self) -> PortsSchema {
            PortsSchema::from([("genes".to_string(), Schema::wildcard(Schema::untyped()))])
        }

        fn next_update(&self, _timestep: f64, view: &PortView) -> std::result::Result<Delta, StepError> {
            if view.record("genes")?.is_empty() {
                return Err(StepError::on_port("genes", "no genes"));
            }
            Ok(Delta::new())
        }
    }

    fn adder(name: &'static str, amount: f64) -> Composite {
        Composite::from_process(Arc::new(Adder { name, amount }))
    }

    #[test]
    fn test_accumulate_from_two_processes() {
        let mut composite = adder("a", 1.0);
        composite.merge(adder("b", 2.0)).unwrap();
        let mut engine = Engine::new(composite).unwrap();

        engine.run_round(1.0).unwrap();
        assert_eq!(engine.read(&Path::from("x")), Some(Value::from(3.0)));
        assert_eq!(engine.time(), 1.0);
        assert_eq!(engine.round(), 1);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let build = |parallel| {
            let mut composite = adder("a", 0.1);
            composite.merge(adder("b", 0.2)).unwrap();
            Engine::builder(composite)
                .config(EngineConfig {
                    parallel,
                    ..EngineConfig::default()
                })
                .build()
                .unwrap()
        };
        let mut parallel = build(true);
        let mut sequential = build(false);
        parallel.advance(5.0).unwrap();
        sequential.advance(5.0).unwrap();
        assert_eq!(parallel.state(), sequential.state());
    }

    #[test]
    fn test_conflicting_set_halts() {
        let mut composite = Composite::from_process(Arc::new(Setter { name: "s1", value: 1.0 }));
        composite
            .merge(Composite::from_process(Arc::new(Setter { name: "s2", value: 2.0 })))
            .unwrap();
        let mut engine = Engine::new(composite).unwrap();

        let err = engine.run_round(1.0).unwrap_err();
        assert_eq!(
            err,
            EngineError::ConflictingUpdate {
                path: "x".into(),
                first: "s1".into(),
                second: "s2".into(),
            }
        );
        assert!(engine.is_halted());
        assert_eq!(engine.time(), 0.0);
        assert!(matches!(engine.run_round(1.0), Err(EngineError::Halted(_))));
    }

    #[test]
    fn test_last_wins_policy() {
        let mut composite = Composite::from_process(Arc::new(Setter { name: "s1", value: 1.0 }));
        composite
            .merge(Composite::from_process(Arc::new(Setter { name: "s2", value: 2.0 })))
            .unwrap();
        let mut engine = Engine::builder(composite)
            .config(EngineConfig {
                set_conflict: SetConflictPolicy::LastWins,
                ..EngineConfig::default()
            })
            .build()
            .unwrap();

        engine.run_round(1.0).unwrap();
        assert_eq!(engine.read(&Path::from("x")), Some(Value::from(2.0)));
    }

    #[test]
    fn test_process_step_error_names_process_and_port() {
        let mut engine = Engine::new(Composite::from_process(Arc::new(Failing))).unwrap();
        let err = engine.run_round(1.0).unwrap_err();
        assert_eq!(
            err,
            EngineError::ProcessStep {
                process: "failing".into(),
                port: Some("genes".into()),
                reason: "no genes".into(),
            }
        );
    }

    #[test]
    fn test_invalid_timestep() {
        let mut engine = Engine::new(adder("a", 1.0)).unwrap();
        assert!(matches!(engine.run_round(0.0), Err(EngineError::InvalidTimestep(_))));
        assert!(matches!(engine.run_round(f64::NAN), Err(EngineError::InvalidTimestep(_))));
        assert!(!engine.is_halted());
    }

    #[test]
    fn test_advance_lands_on_total_time() {
        let mut engine = Engine::builder(adder("a", 1.0))
            .config(EngineConfig {
                timestep: 0.4,
                ..EngineConfig::default()
            })
            .build()
            .unwrap();

        let rounds = engine.advance(1.0).unwrap();
        assert_eq!(rounds, 3);
        assert_eq!(engine.time(), 1.0);
        let x = engine.read(&Path::from("x")).and_then(|v| v.as_f64()).unwrap();
        assert!((x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_last_emission_carries_landed_time() {
        let emitter = RamEmitter::shared();
        let mut engine = Engine::builder(adder("a", 1.0))
            .config(EngineConfig {
                timestep: 0.1,
                ..EngineConfig::default()
            })
            .emitter(emitter.clone())
            .build()
            .unwrap();
        engine.advance(0.3).unwrap();

        let series = emitter.timeseries();
        let last = series["x"].last().map(|(t, _)| *t).unwrap();
        assert_eq!(engine.time(), 0.3);
        assert_eq!(last, 0.3);
    }

    #[test]
    fn test_nested_stateless_composite_builds() {
        let mut composite = adder("a", 1.0);
        composite.merge(Composite::new()).unwrap();
        let nested = Composite::new().nest(&Path::from("phages/phage_0"));
        composite.merge(nested).unwrap();
        composite
            .merge(adder("b", 2.0).nest(&Path::from("phages/phage_0")))
            .unwrap();

        let mut engine = Engine::new(composite).unwrap();
        engine.run_round(1.0).unwrap();
        assert_eq!(engine.read(&Path::from("x")), Some(Value::from(1.0)));
        assert_eq!(engine.read(&Path::from("phages/phage_0/x")), Some(Value::from(2.0)));
    }

    #[test]
    fn test_emission_after_each_round() {
        let emitter = RamEmitter::shared();
        let mut engine = Engine::builder(adder("a", 1.0))
            .emitter(emitter.clone())
            .build()
            .unwrap();
        engine.advance(2.0).unwrap();

        let series = emitter.timeseries();
        let x = &series["x"];
        let times: Vec<f64> = x.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(x[2].1, serde_json::json!(2.0));
    }

    #[test]
    fn test_write_then_halted_write() {
        let mut engine = Engine::new(Composite::from_process(Arc::new(Failing))).unwrap();
        engine.write(&Path::from("other"), Value::from(1.0)).unwrap();
        assert_eq!(engine.read(&Path::from("other")), Some(Value::from(1.0)));

        engine.run_round(1.0).unwrap_err();
        assert!(engine.write(&Path::from("other"), Value::from(2.0)).is_err());
    }

    #[test]
    fn test_unknown_updater_rejected_at_build() {
        #[derive(Debug)]
        struct Custom;
        impl Process for Custom {
            fn name(&self) -> &str {
                "custom"
            }
            fn ports_schema(&self) -> PortsSchema {
                PortsSchema::from([(
                    "x".to_string(),
                    Schema::leaf(LeafSpec::default_value(1.0).updater(UpdaterTag::Custom("product".into()))),
                )])
            }
            fn next_update(&self, _: f64, _: &PortView) -> std::result::Result<Delta, StepError> {
                Ok(Delta::new())
            }
        }

        let err = Engine::new(Composite::from_process(Arc::new(Custom))).unwrap_err();
        assert!(matches!(err, EngineError::UnknownUpdater { .. }));

        let product: UpdaterFn = Arc::new(|_: &Path, a: &Value, b: &Value| -> Result<Value> {
            Ok(Value::from(a.as_f64().unwrap_or(1.0) * b.as_f64().unwrap_or(1.0)))
        });
        let engine = Engine::builder(Composite::from_process(Arc::new(Custom)))
            .updater("product", product)
            .build();
        assert!(engine.is_ok());
    }
}
