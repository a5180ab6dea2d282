//! Values stored at leaves and passed through port views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered mapping used for records and projected subtrees.
pub type Record = BTreeMap<String, Value>;

/// A simulation value.
///
/// Inner tree nodes are projected into process views as [`Value::Record`],
/// so the same type serves leaves, views and nested initial states.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Record(Record),
}

impl Value {
    /// Creates an empty record.
    pub fn record() -> Self {
        Value::Record(Record::new())
    }

    /// Builds a record from `(key, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Record(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns the name of this value's kind (for error messages).
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Record(_) => "record",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the value as a number, treating `Null` as zero.
    pub fn number_or_zero(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Truthiness: `Null`, `false`, `0`, `""` and empty records are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(v) => *v != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Record(r) => !r.is_empty(),
        }
    }

    /// Looks up a key in a record value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_record().and_then(|r| r.get(key))
    }

    /// Follows a sequence of record keys.
    pub fn get_path<S: AsRef<str>>(&self, keys: &[S]) -> Option<&Value> {
        keys.iter()
            .try_fold(self, |value, key| value.get(key.as_ref()))
    }

    /// Deep-merges `other` into `self`, keeping existing entries.
    ///
    /// Records merge key-wise; for any other pairing `self` wins.
    pub fn merge_missing(&mut self, other: &Value) {
        match (self, other) {
            (Value::Record(mine), Value::Record(theirs)) => {
                for (key, value) in theirs {
                    match mine.get_mut(key) {
                        Some(existing) => existing.merge_missing(value),
                        None => {
                            mine.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (mine @ Value::Null, theirs) => *mine = theirs.clone(),
            _ => {}
        }
    }

    /// Deep-merges `other` into `self`, overwriting leaves. A `Null` on
    /// the other side overwrites nothing.
    pub fn merge_over(&mut self, other: &Value) {
        match (self, other) {
            (Value::Record(mine), Value::Record(theirs)) => {
                for (key, value) in theirs {
                    match mine.get_mut(key) {
                        Some(existing) => existing.merge_over(value),
                        None => {
                            mine.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (_, Value::Null) => {}
            (mine, theirs) => *mine = theirs.clone(),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Record(r) => serde_json::Value::Object(
                r.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", serde_json::Value::from(self))
    }
}
