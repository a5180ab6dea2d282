//! Port schemas and the views realized from them.
//!
//! A process declares, per port, the shape of state it needs. Before every
//! round the engine *ensures* each shape against the tree (creating missing
//! defaulted leaves and fixed branches) and then *realizes* it into a
//! read-only [`PortView`] for the process.

use crate::error::Result;
use crate::path::Path;
use crate::process::StepError;
use crate::tree::{DividerTag, StateTree, UpdaterTag};
use crate::value::{Record, Value};
use std::collections::BTreeMap;

/// Port name -> declared shape.
pub type PortsSchema = BTreeMap<String, Schema>;

/// Declaration of a single leaf.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafSpec {
    /// Value used when the leaf is first created. `None` declares an untyped
    /// port that binds whatever node already exists there.
    pub default: Option<Value>,
    pub emit: bool,
    pub updater: Option<UpdaterTag>,
    pub divider: Option<DividerTag>,
}

impl LeafSpec {
    /// An untyped declaration with no metadata.
    pub fn untyped() -> Self {
        Self::default()
    }

    /// A declaration with a default value.
    pub fn default_value(value: impl Into<Value>) -> Self {
        Self {
            default: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn emit(mut self) -> Self {
        self.emit = true;
        self
    }

    pub fn updater(mut self, updater: UpdaterTag) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn divider(mut self, divider: DividerTag) -> Self {
        self.divider = Some(divider);
        self
    }

    pub fn is_untyped(&self) -> bool {
        self.default.is_none()
    }
}

/// Shape of the state behind one port.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// A single leaf (or, when untyped, whatever node sits there).
    Leaf(LeafSpec),
    /// Fixed child keys.
    Branch(BTreeMap<String, Schema>),
    /// One entry per existing child, each sharing the same sub-shape.
    Wildcard(Box<Schema>),
}

impl Schema {
    pub fn leaf(spec: LeafSpec) -> Self {
        Schema::Leaf(spec)
    }

    /// An untyped leaf.
    pub fn untyped() -> Self {
        Schema::Leaf(LeafSpec::untyped())
    }

    /// An empty fixed branch.
    pub fn branch() -> Self {
        Schema::Branch(BTreeMap::new())
    }

    /// A fixed branch from `(key, shape)` pairs.
    pub fn branch_of<K, I>(children: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Schema::Branch(children.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    /// A wildcard collection sharing `item`.
    pub fn wildcard(item: Schema) -> Self {
        Schema::Wildcard(Box::new(item))
    }

    /// Creates whatever this shape requires at `path` that is still missing.
    ///
    /// Idempotent: existing values are never touched, only their metadata
    /// is merged.
    pub fn ensure(&self, tree: &mut StateTree, path: &Path) -> Result<()> {
        match self {
            Schema::Leaf(spec) => tree.ensure(path, spec).map(|_| ()),
            Schema::Branch(children) => {
                tree.ensure_inner(path)?;
                for (key, child) in children {
                    child.ensure(tree, &path.child(key.as_str()))?;
                }
                Ok(())
            }
            Schema::Wildcard(item) => {
                tree.ensure_inner(path)?;
                for key in tree.child_keys(path) {
                    item.ensure(tree, &path.child(key))?;
                }
                Ok(())
            }
        }
    }

    /// Projects the tree at `path` through this shape.
    ///
    /// Returns `Ok(None)` for an optional entry that does not exist, and
    /// `Err(path)` naming the first required location that is missing.
    /// Entries beneath a wildcard are never required.
    pub fn realize(
        &self,
        tree: &StateTree,
        path: &Path,
        required: bool,
    ) -> std::result::Result<Option<Value>, Path> {
        match self {
            Schema::Leaf(spec) => match tree.node(path) {
                Some(node) => Ok(Some(node.to_value())),
                None => match &spec.default {
                    Some(default) => Ok(Some(default.clone())),
                    None if required => Err(path.clone()),
                    None => Ok(None),
                },
            },
            Schema::Branch(children) => {
                if !required && !tree.contains(path) {
                    return Ok(None);
                }
                let mut record = Record::new();
                for (key, child) in children {
                    if let Some(value) = child.realize(tree, &path.child(key.as_str()), required)? {
                        record.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Record(record)))
            }
            Schema::Wildcard(item) => {
                let mut record = Record::new();
                for key in tree.child_keys(path) {
                    if let Some(value) = item.realize(tree, &path.child(key.as_str()), false)? {
                        record.insert(key, value);
                    }
                }
                Ok(Some(Value::Record(record)))
            }
        }
    }
}

/// The read-only state a process sees for one round, keyed by port name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortView {
    ports: BTreeMap<String, Value>,
}

impl PortView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a view directly, bypassing the tree (for tests and drivers).
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            ports: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub(crate) fn insert(&mut self, port: impl Into<String>, value: Value) {
        self.ports.insert(port.into(), value);
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.ports.get(port)
    }

    pub fn ports(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.ports.iter()
    }

    /// Returns the value behind `port`.
    pub fn value(&self, port: &str) -> std::result::Result<&Value, StepError> {
        self.ports
            .get(port)
            .ok_or_else(|| StepError::on_port(port, "port not in view"))
    }

    /// Returns `port` as a number; `Null` reads as zero.
    pub fn number(&self, port: &str) -> std::result::Result<f64, StepError> {
        let value = self.value(port)?;
        value
            .number_or_zero()
            .ok_or_else(|| StepError::on_port(port, format!("expected number, found {}", value.kind())))
    }

    /// Returns `port` as a record; an absent collection reads as empty.
    pub fn record(&self, port: &str) -> std::result::Result<Record, StepError> {
        match self.value(port)? {
            Value::Record(record) => Ok(record.clone()),
            Value::Null => Ok(Record::new()),
            other => Err(StepError::on_port(
                port,
                format!("expected record, found {}", other.kind()),
            )),
        }
    }

    /// Reads a number nested under `port`, treating a missing entry as zero.
    pub fn nested_number<S: AsRef<str>>(
        &self,
        port: &str,
        keys: &[S],
    ) -> std::result::Result<f64, StepError> {
        match self.value(port)?.get_path(keys) {
            None => Ok(0.0),
            Some(value) => value.number_or_zero().ok_or_else(|| {
                StepError::on_port(port, format!("expected number, found {}", value.kind()))
            }),
        }
    }
}
