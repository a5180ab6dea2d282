//! Dividers: how a leaf's value is shared between two daughters.

use crate::error::{EngineError, Result};
use crate::path::Path;
use crate::tree::{DividerTag, Leaf, Node};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A custom divider: `(path, value) -> (first, second)`.
pub type DividerFn = Arc<dyn Fn(&Path, &Value) -> Result<(Value, Value)> + Send + Sync>;

/// Named division rules.
///
/// `split`, `copy` and `zero` are built in. Leaves without a divider are
/// copied unchanged into both daughters.
#[derive(Clone, Default)]
pub struct DividerRegistry {
    custom: BTreeMap<String, DividerFn>,
}

impl std::fmt::Debug for DividerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DividerRegistry")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DividerRegistry {
    pub fn register(&mut self, name: impl Into<String>, divider: DividerFn) {
        self.custom.insert(name.into(), divider);
    }

    /// Divides one value under `tag`.
    pub fn divide(&self, tag: Option<&DividerTag>, path: &Path, value: &Value) -> Result<(Value, Value)> {
        match tag {
            None | Some(DividerTag::Copy) => Ok((value.clone(), value.clone())),
            Some(DividerTag::Split) => split(path, value),
            Some(DividerTag::Zero) => Ok((Value::from(0.0), Value::from(0.0))),
            Some(DividerTag::Custom(name)) => {
                let divider = self.custom.get(name).ok_or_else(|| EngineError::UnknownDivider {
                    path: path.to_string(),
                    divider: name.clone(),
                })?;
                divider(path, value)
            }
        }
    }

    /// Produces two daughter subtrees from `node`, applying each leaf's
    /// divider. `path` is the mother's location, used in errors.
    pub fn divide_node(&self, node: &Node, path: &Path) -> Result<(Node, Node)> {
        match node {
            Node::Leaf(leaf) => {
                let (a, b) = self.divide(leaf.divider.as_ref(), path, &leaf.value)?;
                Ok((Node::Leaf(with_value(leaf, a)), Node::Leaf(with_value(leaf, b))))
            }
            Node::Inner(children) => {
                let mut first = BTreeMap::new();
                let mut second = BTreeMap::new();
                for (key, child) in children {
                    let (a, b) = self.divide_node(child, &path.child(key.as_str()))?;
                    first.insert(key.clone(), a);
                    second.insert(key.clone(), b);
                }
                Ok((Node::Inner(first), Node::Inner(second)))
            }
        }
    }
}

fn with_value(leaf: &Leaf, value: Value) -> Leaf {
    Leaf {
        value,
        ..leaf.clone()
    }
}

/// Halves a number; `Null` divides into two `Null`s.
pub fn split(path: &Path, value: &Value) -> Result<(Value, Value)> {
    match value {
        Value::Number(v) => Ok((Value::Number(v / 2.0), Value::Number(v / 2.0))),
        Value::Null => Ok((Value::Null, Value::Null)),
        other => Err(EngineError::mismatch(path, "number", other.kind())),
    }
}
