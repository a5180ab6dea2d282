//! Observer interface for emitted leaves.

use crate::types::EmitRecord;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Per-path history of emitted values: `path -> [(time, value)]`.
pub type Timeseries = BTreeMap<String, Vec<(f64, serde_json::Value)>>;

/// Receives the stream of `(time, path, value)` records for every leaf
/// flagged `emit`.
///
/// # Implementations
///
/// - **Recording**: `RamEmitter` - keeps every record in memory
/// - **Logging**: `LogEmitter` - forwards records as `trace!` events
/// - **Silent**: `NullEmitter` - drops everything
///
/// Emitters are shared between the engine and whoever inspects the run, so
/// `emit` takes `&self` and implementations handle their own locking.
pub trait Emitter: Send + Sync {
    /// Records one observation.
    fn emit(&self, record: EmitRecord);

    /// Records a batch of observations from one round.
    fn emit_all(&self, records: Vec<EmitRecord>) {
        for record in records {
            self.emit(record);
        }
    }
}

/// In-memory emitter used by experiments and tests.
#[derive(Debug, Default)]
pub struct RamEmitter {
    records: Mutex<Vec<EmitRecord>>,
}

impl RamEmitter {
    /// Creates an empty emitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped emitter for sharing with an engine.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns a copy of every record received so far.
    pub fn records(&self) -> Vec<EmitRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Returns the number of records received.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Returns true if nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Groups records by path, in emission order.
    pub fn timeseries(&self) -> Timeseries {
        let records = self.records.lock().unwrap();
        let mut series = Timeseries::new();
        for record in records.iter() {
            series
                .entry(record.path_key())
                .or_default()
                .push((record.time, record.value.clone()));
        }
        series
    }

    /// Returns the most recent value emitted for a path.
    pub fn latest(&self, path: &str) -> Option<serde_json::Value> {
        let records = self.records.lock().unwrap();
        records
            .iter()
            .rev()
            .find(|r| r.path_key() == path)
            .map(|r| r.value.clone())
    }

    /// Removes all records.
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl Emitter for RamEmitter {
    fn emit(&self, record: EmitRecord) {
        self.records.lock().unwrap().push(record);
    }

    fn emit_all(&self, records: Vec<EmitRecord>) {
        self.records.lock().unwrap().extend(records);
    }
}

/// Emitter that forwards records to `tracing` at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmitter;

impl Emitter for LogEmitter {
    fn emit(&self, record: EmitRecord) {
        tracing::trace!(
            time = record.time,
            path = %record.path_key(),
            value = %record.value,
            "emit"
        );
    }
}

/// Emitter that discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&self, _record: EmitRecord) {}
}
