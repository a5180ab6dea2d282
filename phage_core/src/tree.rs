//! The State Tree - nested, path-addressed store of all simulation values.
//!
//! Inner nodes map child names to nodes; leaves hold a value plus the
//! metadata that governs merging (`updater`), division (`divider`) and
//! observation (`emit`).
//!
//! Processes never hold references into the tree. They receive projected
//! views and return data describing intended changes; only the engine's
//! merge phase mutates the tree.

use crate::error::{EngineError, Result};
use crate::path::Path;
use crate::schema::LeafSpec;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a delta combines with a leaf's current value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdaterTag {
    /// Add the delta to the current value.
    Accumulate,
    /// Replace the current value.
    Set,
    /// A rule registered by name in the `UpdaterRegistry`.
    Custom(String),
}

impl UpdaterTag {
    pub fn name(&self) -> &str {
        match self {
            UpdaterTag::Accumulate => "accumulate",
            UpdaterTag::Set => "set",
            UpdaterTag::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for UpdaterTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a leaf's value is shared between two daughters on division.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividerTag {
    /// Halve additive quantities.
    Split,
    /// Give both daughters the same value.
    Copy,
    /// Reset both daughters to zero.
    Zero,
    /// A rule registered by name in the `DividerRegistry`.
    Custom(String),
}

impl DividerTag {
    pub fn name(&self) -> &str {
        match self {
            DividerTag::Split => "split",
            DividerTag::Copy => "copy",
            DividerTag::Zero => "zero",
            DividerTag::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for DividerTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A leaf of the state tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Current value
    pub value: Value,

    /// Value the leaf was created with
    pub default: Value,

    /// Report this leaf to the emitter after each round
    pub emit: bool,

    /// Declared updater; `None` merges as `accumulate`
    pub updater: Option<UpdaterTag>,

    /// Declared divider; `None` copies the value into both daughters
    pub divider: Option<DividerTag>,
}

impl Leaf {
    /// Creates an undeclared leaf holding `value`.
    pub fn new(value: Value) -> Self {
        Self {
            default: value.clone(),
            value,
            emit: false,
            updater: None,
            divider: None,
        }
    }

    /// Creates a leaf from a schema declaration.
    pub fn from_spec(spec: &LeafSpec) -> Self {
        let value = spec.default.clone().unwrap_or_default();
        Self {
            default: value.clone(),
            value,
            emit: spec.emit,
            updater: spec.updater.clone(),
            divider: spec.divider.clone(),
        }
    }

    /// Returns the effective updater.
    pub fn updater(&self) -> UpdaterTag {
        self.updater.clone().unwrap_or(UpdaterTag::Accumulate)
    }

    /// Folds another declaration's metadata into this leaf.
    ///
    /// `emit` is OR-ed; an undeclared updater or divider adopts the declared
    /// one; two different declarations conflict.
    pub fn absorb(&mut self, spec: &LeafSpec, path: &Path) -> Result<()> {
        self.emit |= spec.emit;
        match (&self.updater, &spec.updater) {
            (Some(mine), Some(theirs)) if mine != theirs => {
                return Err(EngineError::schema(
                    path,
                    format!("updater `{mine}` redeclared as `{theirs}`"),
                ));
            }
            (None, Some(theirs)) => self.updater = Some(theirs.clone()),
            _ => {}
        }
        match (&self.divider, &spec.divider) {
            (Some(mine), Some(theirs)) if mine != theirs => {
                return Err(EngineError::schema(
                    path,
                    format!("divider `{mine}` redeclared as `{theirs}`"),
                ));
            }
            (None, Some(theirs)) => self.divider = Some(theirs.clone()),
            _ => {}
        }
        Ok(())
    }
}

/// A node of the state tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Inner(BTreeMap<String, Node>),
    Leaf(Leaf),
}

impl Node {
    /// Creates an empty inner node.
    pub fn inner() -> Self {
        Node::Inner(BTreeMap::new())
    }

    /// Builds a subtree from a value: records become inner nodes, anything
    /// else becomes an undeclared leaf.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Record(record) => Node::Inner(
                record
                    .iter()
                    .map(|(k, v)| (k.clone(), Node::from_value(v)))
                    .collect(),
            ),
            other => Node::Leaf(Leaf::new(other.clone())),
        }
    }

    /// Projects this node as a value: leaves yield their value, inner nodes
    /// yield a record of their projected children.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Leaf(leaf) => leaf.value.clone(),
            Node::Inner(children) => Value::Record(
                children
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect::<Record>(),
            ),
        }
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Node::Inner(_))
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Inner(_) => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Inner(children) => Some(children),
            Node::Leaf(_) => None,
        }
    }

    fn descend(&self, segments: &[String]) -> Option<&Node> {
        segments.iter().try_fold(self, |node, seg| match node {
            Node::Inner(children) => children.get(seg),
            Node::Leaf(_) => None,
        })
    }

    fn descend_mut(&mut self, segments: &[String]) -> Option<&mut Node> {
        segments.iter().try_fold(self, |node, seg| match node {
            Node::Inner(children) => children.get_mut(seg),
            Node::Leaf(_) => None,
        })
    }

    /// Fills in `value` wherever this subtree has nothing yet.
    pub fn fill_missing(&mut self, value: &Value) {
        if let (Node::Inner(children), Value::Record(record)) = (self, value) {
            for (key, child_value) in record {
                match children.get_mut(key) {
                    Some(existing) => existing.fill_missing(child_value),
                    None => {
                        children.insert(key.clone(), Node::from_value(child_value));
                    }
                }
            }
        }
    }

    fn collect_leaves<'a>(&'a self, path: &mut Vec<String>, out: &mut Vec<(Path, &'a Leaf)>) {
        match self {
            Node::Leaf(leaf) => out.push((Path::new(path.iter().cloned()), leaf)),
            Node::Inner(children) => {
                for (key, child) in children {
                    path.push(key.clone());
                    child.collect_leaves(path, out);
                    path.pop();
                }
            }
        }
    }
}

/// The simulation state: a single inner root node.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTree {
    root: Node,
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self { root: Node::inner() }
    }

    /// Creates a tree seeded from a nested record.
    pub fn from_value(value: &Value) -> Self {
        let mut tree = Self::new();
        tree.root.fill_missing(value);
        tree
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Returns the node at `path`.
    pub fn node(&self, path: &Path) -> Option<&Node> {
        self.root.descend(path.segments())
    }

    fn node_mut(&mut self, path: &Path) -> Option<&mut Node> {
        self.root.descend_mut(path.segments())
    }

    /// Returns the leaf at `path`.
    pub fn leaf(&self, path: &Path) -> Option<&Leaf> {
        self.node(path).and_then(Node::as_leaf)
    }

    pub(crate) fn leaf_mut(&mut self, path: &Path) -> Option<&mut Leaf> {
        match self.node_mut(path) {
            Some(Node::Leaf(leaf)) => Some(leaf),
            _ => None,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.node(path).is_some()
    }

    /// Reads the projected value at `path`.
    pub fn read(&self, path: &Path) -> Option<Value> {
        self.node(path).map(Node::to_value)
    }

    /// Reads the value at `path`, creating it from `spec`'s default first if
    /// it is absent. Idempotent.
    pub fn read_or_ensure(&mut self, path: &Path, spec: &LeafSpec) -> Result<Value> {
        self.ensure(path, spec)?;
        self.read(path)
            .ok_or_else(|| EngineError::structural(path, "no default declared"))
    }

    /// Returns the child keys of the inner node at `path`.
    pub fn child_keys(&self, path: &Path) -> Vec<String> {
        self.node(path)
            .and_then(Node::children)
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes sure an inner node exists at `path`, creating every missing
    /// level on the way.
    pub fn ensure_inner(&mut self, path: &Path) -> Result<()> {
        let mut node = &mut self.root;
        for (depth, seg) in path.segments().iter().enumerate() {
            node = match node {
                Node::Inner(children) => children.entry(seg.clone()).or_insert_with(Node::inner),
                Node::Leaf(_) => {
                    let at = Path::new(path.segments()[..depth].iter().cloned());
                    return Err(EngineError::schema(at, "expected a branch, found a leaf"));
                }
            };
        }
        if node.is_inner() {
            Ok(())
        } else {
            Err(EngineError::schema(path, "expected a branch, found a leaf"))
        }
    }

    /// Makes sure a leaf declared by `spec` exists at `path`.
    ///
    /// Missing leaves are created from the declared default; existing leaves
    /// absorb the declaration's metadata. A declaration without a default
    /// creates nothing. Returns true if a leaf was created.
    pub fn ensure(&mut self, path: &Path, spec: &LeafSpec) -> Result<bool> {
        match self.node_mut(path) {
            Some(Node::Leaf(leaf)) => {
                leaf.absorb(spec, path)?;
                Ok(false)
            }
            Some(Node::Inner(_)) => {
                if spec.is_untyped() {
                    Ok(false)
                } else {
                    Err(EngineError::schema(path, "leaf declared over a branch"))
                }
            }
            None => {
                if spec.default.is_none() {
                    return Ok(false);
                }
                self.insert(path, Node::Leaf(Leaf::from_spec(spec)))?;
                Ok(true)
            }
        }
    }

    /// Replaces the value of the leaf at `path`, creating it if needed.
    ///
    /// A record written over a branch is merged key by key.
    pub fn write(&mut self, path: &Path, value: Value) -> Result<()> {
        match self.node_mut(path) {
            Some(Node::Leaf(leaf)) => {
                leaf.value = value;
                Ok(())
            }
            Some(Node::Inner(_)) => match value {
                Value::Record(record) => {
                    for (key, child) in record {
                        self.write(&path.child(key), child)?;
                    }
                    Ok(())
                }
                other => Err(EngineError::mismatch(path, "record", other.kind())),
            },
            None => self.insert(path, Node::from_value(&value)),
        }
    }

    /// Inserts `node` at `path`, creating missing ancestors.
    ///
    /// Fails if something already occupies `path`.
    pub fn insert(&mut self, path: &Path, node: Node) -> Result<()> {
        let (parent, key) = match (path.parent(), path.key()) {
            (Some(parent), Some(key)) => (parent, key.to_string()),
            _ => return Err(EngineError::structural(path, "cannot replace the root")),
        };
        self.ensure_inner(&parent)?;
        match self.node_mut(&parent) {
            Some(Node::Inner(children)) => {
                if children.contains_key(&key) {
                    return Err(EngineError::structural(path, "already exists"));
                }
                children.insert(key, node);
                Ok(())
            }
            _ => Err(EngineError::structural(&parent, "parent is not a branch")),
        }
    }

    /// Deletes the subtree at `path` and returns it.
    pub fn remove(&mut self, path: &Path) -> Result<Node> {
        let (parent, key) = match (path.parent(), path.key()) {
            (Some(parent), Some(key)) => (parent, key.to_string()),
            _ => return Err(EngineError::structural(path, "cannot remove the root")),
        };
        match self.node_mut(&parent) {
            Some(Node::Inner(children)) => children
                .remove(&key)
                .ok_or_else(|| EngineError::structural(path, "does not exist")),
            _ => Err(EngineError::structural(path, "does not exist")),
        }
    }

    /// Returns a detached copy of the subtree at `path`.
    pub fn clone_subtree(&self, path: &Path) -> Result<Node> {
        self.node(path)
            .cloned()
            .ok_or_else(|| EngineError::structural(path, "does not exist"))
    }

    /// Fills `value` into the subtree at `path` wherever nothing exists yet.
    pub fn fill_missing(&mut self, path: &Path, value: &Value) -> Result<()> {
        self.ensure_inner(path)?;
        if let Some(node) = self.node_mut(path) {
            node.fill_missing(value);
        }
        Ok(())
    }

    /// Returns every leaf with its path, in path order.
    pub fn leaves(&self) -> Vec<(Path, &Leaf)> {
        let mut out = Vec::new();
        self.root.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    /// Returns every `emit`-flagged leaf with its path, in path order.
    pub fn emitted(&self) -> Vec<(Path, &Leaf)> {
        self.leaves().into_iter().filter(|(_, leaf)| leaf.emit).collect()
    }

    /// Projects the whole tree as a record.
    pub fn to_value(&self) -> Value {
        self.root.to_value()
    }
}
