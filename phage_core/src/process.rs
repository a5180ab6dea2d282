//! Processes and the deltas they return.

use crate::composite::Composite;
use crate::schema::{PortView, PortsSchema};
use crate::value::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// A unit of behavior wired into the state tree through its ports.
///
/// A process is immutable once constructed. Each round it receives a view of
/// the pre-round snapshot and returns a [`Delta`] describing the changes it
/// intends; it never touches the tree itself.
pub trait Process: Send + Sync + std::fmt::Debug {
    /// Short name used as the last segment of the process identity.
    fn name(&self) -> &str;

    /// Shape of state this process needs, per port.
    fn ports_schema(&self) -> PortsSchema;

    /// Initial values keyed by port name, seeded when the process is
    /// wrapped in a composite.
    fn initial_state(&self) -> Value {
        Value::Null
    }

    /// Computes this round's contribution.
    fn next_update(&self, timestep: f64, view: &PortView) -> Result<Delta, StepError>;
}

/// Failure of a process to operate on a valid view.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct StepError {
    pub port: Option<String>,
    pub reason: String,
}

impl StepError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            port: None,
            reason: reason.into(),
        }
    }

    pub fn on_port(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            port: Some(port.into()),
            reason: reason.into(),
        }
    }
}

/// An instruction that changes the shape of the tree.
///
/// Paths are relative to the absolute location of the update branch that
/// carries the instruction.
#[derive(Debug, Clone)]
pub enum Structural {
    /// Insert `state` as a new child `key` of the branch.
    Add { key: String, state: Value },
    /// Attach a composite at child `key`, or at the branch itself.
    Generate {
        key: Option<String>,
        composite: Composite,
    },
    /// Replace child `key` (or the branch itself) with two daughters.
    Divide {
        key: Option<String>,
        daughters: Option<[String; 2]>,
    },
    /// Delete child `key`.
    Remove { key: String },
}

impl Structural {
    pub fn add(key: impl Into<String>, state: impl Into<Value>) -> Self {
        Structural::Add {
            key: key.into(),
            state: state.into(),
        }
    }

    pub fn generate(key: Option<String>, composite: Composite) -> Self {
        Structural::Generate { key, composite }
    }

    /// Divides the carrying branch into generated daughter keys.
    pub fn divide_self() -> Self {
        Structural::Divide {
            key: None,
            daughters: None,
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Structural::Remove { key: key.into() }
    }
}

/// Changes addressed to one node: nested child updates plus structural
/// instructions anchored at the node.
#[derive(Debug, Clone, Default)]
pub struct UpdateBranch {
    pub children: BTreeMap<String, Update>,
    pub ops: Vec<Structural>,
}

/// An update for one location.
#[derive(Debug, Clone)]
pub enum Update {
    /// Merge a value through the target leaf's updater.
    Value(Value),
    /// Descend into child keys and/or carry structural instructions.
    Branch(UpdateBranch),
}

impl Update {
    fn branch_mut(&mut self) -> &mut UpdateBranch {
        if let Update::Value(value) = self {
            let mut branch = UpdateBranch::default();
            if let Value::Record(record) = std::mem::take(value) {
                branch.children = record
                    .into_iter()
                    .map(|(k, v)| (k, Update::Value(v)))
                    .collect();
            }
            *self = Update::Branch(branch);
        }
        match self {
            Update::Branch(branch) => branch,
            Update::Value(_) => unreachable!("converted above"),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Update::Value(_) => false,
            Update::Branch(branch) => {
                branch.ops.is_empty() && branch.children.values().all(Update::is_empty)
            }
        }
    }
}

/// A process's contribution for one round, keyed by port name.
///
/// A port (or nested key) that is absent means "no change".
#[derive(Debug, Clone, Default)]
pub struct Delta {
    ports: BTreeMap<String, Update>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value for `port`.
    pub fn value(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ports.insert(port.into(), Update::Value(value.into()));
        self
    }

    /// Adds a value at `keys` beneath `port`.
    pub fn nested<S: AsRef<str>>(
        mut self,
        port: impl Into<String>,
        keys: &[S],
        value: impl Into<Value>,
    ) -> Self {
        let (last, parents) = match keys.split_last() {
            Some(split) => split,
            None => return self.value(port, value),
        };
        let branch = self.branch_at(port, parents);
        branch
            .children
            .insert(last.as_ref().to_string(), Update::Value(value.into()));
        self
    }

    /// Attaches a structural instruction to the node behind `port`.
    pub fn op(self, port: impl Into<String>, op: Structural) -> Self {
        self.op_at::<&str>(port, &[], op)
    }

    /// Attaches a structural instruction at `keys` beneath `port`.
    pub fn op_at<S: AsRef<str>>(
        mut self,
        port: impl Into<String>,
        keys: &[S],
        op: Structural,
    ) -> Self {
        self.branch_at(port, keys).ops.push(op);
        self
    }

    fn branch_at<S: AsRef<str>>(&mut self, port: impl Into<String>, keys: &[S]) -> &mut UpdateBranch {
        let mut branch = self
            .ports
            .entry(port.into())
            .or_insert_with(|| Update::Branch(UpdateBranch::default()))
            .branch_mut();
        for key in keys {
            branch = branch
                .children
                .entry(key.as_ref().to_string())
                .or_insert_with(|| Update::Branch(UpdateBranch::default()))
                .branch_mut();
        }
        branch
    }

    pub fn get(&self, port: &str) -> Option<&Update> {
        self.ports.get(port)
    }

    /// True if the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.ports.values().all(Update::is_empty)
    }

    pub fn into_ports(self) -> impl Iterator<Item = (String, Update)> {
        self.ports.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_builds_branches() {
        let delta = Delta::new()
            .nested("proteins", &["phage", "count"], 3.0)
            .nested("proteins", &["growth", "count"], 1.0);

        let Some(Update::Branch(proteins)) = delta.get("proteins") else {
            panic!("expected branch");
        };
        assert_eq!(proteins.children.len(), 2);
        assert!(matches!(
            proteins.children.get("phage"),
            Some(Update::Branch(b)) if matches!(b.children.get("count"), Some(Update::Value(Value::Number(v))) if *v == 3.0)
        ));
    }

    #[test]
    fn test_op_on_value_port_keeps_record_children() {
        let delta = Delta::new()
            .value("cells", Value::from_pairs([("cell_0", Value::from_pairs([("x", 1.0)]))]))
            .op("cells", Structural::remove("cell_1"));

        let Some(Update::Branch(cells)) = delta.get("cells") else {
            panic!("expected branch");
        };
        assert_eq!(cells.ops.len(), 1);
        assert!(cells.children.contains_key("cell_0"));
    }

    #[test]
    fn test_empty_delta() {
        assert!(Delta::new().is_empty());
        assert!(!Delta::new().value("x", 0.0).is_empty());
        assert!(!Delta::new().op("agent", Structural::divide_self()).is_empty());
    }

    #[test]
    fn test_step_error_port() {
        let err = StepError::on_port("genes", "empty");
        assert_eq!(err.port.as_deref(), Some("genes"));
        assert_eq!(err.to_string(), "empty");
    }
}
