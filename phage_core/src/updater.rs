//! Updaters: how a delta combines with a leaf's current value.

use crate::error::{EngineError, Result};
use crate::path::Path;
use crate::tree::UpdaterTag;
use crate::value::{Record, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A custom updater: `(path, current, delta) -> new value`.
pub type UpdaterFn = Arc<dyn Fn(&Path, &Value, &Value) -> Result<Value> + Send + Sync>;

/// Named merge rules.
///
/// `accumulate` and `set` are built in; `nonnegative_accumulate` is
/// registered by default.
#[derive(Clone)]
pub struct UpdaterRegistry {
    custom: BTreeMap<String, UpdaterFn>,
}

impl std::fmt::Debug for UpdaterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdaterRegistry")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for UpdaterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            custom: BTreeMap::new(),
        };
        registry.register("nonnegative_accumulate", Arc::new(nonnegative_accumulate));
        registry
    }
}

impl UpdaterRegistry {
    pub fn register(&mut self, name: impl Into<String>, updater: UpdaterFn) {
        self.custom.insert(name.into(), updater);
    }

    pub fn contains(&self, tag: &UpdaterTag) -> bool {
        match tag {
            UpdaterTag::Custom(name) => self.custom.contains_key(name),
            _ => true,
        }
    }

    /// Combines `delta` with `current` under `tag`.
    pub fn apply(&self, tag: &UpdaterTag, path: &Path, current: &Value, delta: &Value) -> Result<Value> {
        match tag {
            UpdaterTag::Accumulate => accumulate(path, current, delta),
            UpdaterTag::Set => Ok(delta.clone()),
            UpdaterTag::Custom(name) => {
                let updater = self.custom.get(name).ok_or_else(|| EngineError::UnknownUpdater {
                    path: path.to_string(),
                    updater: name.clone(),
                })?;
                updater(path, current, delta)
            }
        }
    }
}

/// Adds numbers; `Null` is the identity and records add key-wise.
pub fn accumulate(path: &Path, current: &Value, delta: &Value) -> Result<Value> {
    match (current, delta) {
        (current, Value::Null) => Ok(current.clone()),
        (Value::Null, delta) => Ok(delta.clone()),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::Record(a), Value::Record(b)) => {
            let mut merged: Record = a.clone();
            for (key, value) in b {
                let sum = match a.get(key) {
                    Some(existing) => accumulate(&path.child(key.as_str()), existing, value)?,
                    None => value.clone(),
                };
                merged.insert(key.clone(), sum);
            }
            Ok(Value::Record(merged))
        }
        (current, _) => Err(EngineError::mismatch(path, delta.kind(), current.kind())),
    }
}

fn nonnegative_accumulate(path: &Path, current: &Value, delta: &Value) -> Result<Value> {
    match accumulate(path, current, delta)? {
        Value::Number(v) => Ok(Value::Number(v.max(0.0))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_numbers_and_null() {
        let path = Path::from("x");
        assert_eq!(
            accumulate(&path, &Value::from(1.0), &Value::from(2.5)).unwrap(),
            Value::from(3.5)
        );
        assert_eq!(
            accumulate(&path, &Value::Null, &Value::from(2.0)).unwrap(),
            Value::from(2.0)
        );
        assert_eq!(
            accumulate(&path, &Value::from(2.0), &Value::Null).unwrap(),
            Value::from(2.0)
        );
    }

    #[test]
    fn test_accumulate_type_mismatch() {
        let err = accumulate(&Path::from("x"), &Value::from("cell_0"), &Value::from(1.0)).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_set_replaces() {
        let registry = UpdaterRegistry::default();
        let value = registry
            .apply(&UpdaterTag::Set, &Path::from("x"), &Value::from(1.0), &Value::from(false))
            .unwrap();
        assert_eq!(value, Value::from(false));
    }

    #[test]
    fn test_nonnegative_accumulate_clamps() {
        let registry = UpdaterRegistry::default();
        let tag = UpdaterTag::Custom("nonnegative_accumulate".into());
        let value = registry
            .apply(&tag, &Path::from("x"), &Value::from(1.0), &Value::from(-3.0))
            .unwrap();
        assert_eq!(value, Value::from(0.0));
    }

    #[test]
    fn test_unknown_updater() {
        let registry = UpdaterRegistry::default();
        let tag = UpdaterTag::Custom("multiply".into());
        assert!(!registry.contains(&tag));
        let err = registry
            .apply(&tag, &Path::from("x"), &Value::from(1.0), &Value::from(2.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownUpdater { .. }));
    }

    #[test]
    fn test_custom_updater() {
        let mut registry = UpdaterRegistry::default();
        registry.register(
            "max",
            Arc::new(|_: &Path, a: &Value, b: &Value| -> Result<Value> {
                Ok(Value::from(a.number_or_zero().unwrap_or(0.0).max(b.number_or_zero().unwrap_or(0.0))))
            }),
        );
        let value = registry
            .apply(&UpdaterTag::Custom("max".into()), &Path::root(), &Value::from(4.0), &Value::from(2.0))
            .unwrap();
        assert_eq!(value, Value::from(4.0));
    }
}
