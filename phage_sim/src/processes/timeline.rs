//! Scheduled external events.

use phage_core::{
    Composite, Delta, LeafSpec, Path, PortView, PortsSchema, Process, Result as EngineResult,
    Schema, StepError, Topology, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Values written at one point in time, keyed by `/`-separated path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub time: f64,
    pub set: BTreeMap<String, Value>,
}

impl TimelineEvent {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            set: BTreeMap::new(),
        }
    }

    pub fn with(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(path.into(), value.into());
        self
    }
}

/// Timeline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub events: Vec<TimelineEvent>,

    /// Location of the timeline's own clock
    pub clock_path: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            clock_path: "global/time".to_string(),
        }
    }
}

/// Writes scheduled values in the round whose interval `[t, t + dt)`
/// contains the event time.
///
/// Targets are written through their leaf's updater, so events meant to
/// replace a value should address `set` leaves. The timeline keeps its own
/// clock leaf rather than reading engine time.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    config: TimelineConfig,
}

impl Timeline {
    pub fn new(config: TimelineConfig) -> Self {
        Self { config }
    }

    /// Wraps the timeline in a composite attached at the root, with one
    /// topology entry per target path.
    pub fn composite(config: TimelineConfig) -> EngineResult<Composite> {
        let mut topology = Topology::new().with("time", Path::parse(&config.clock_path).segments());
        for event in &config.events {
            for path in event.set.keys() {
                topology.insert(path.clone(), Path::parse(path).segments());
            }
        }
        Composite::new().with_process("timeline", Arc::new(Self::new(config)), topology)
    }
}

impl Process for Timeline {
    fn name(&self) -> &str {
        "timeline"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "time".to_string(),
            Schema::leaf(LeafSpec::default_value(0.0)),
        )])
    }

    fn next_update(&self, timestep: f64, view: &PortView) -> Result<Delta, StepError> {
        let now = view.number("time")?;
        let end = now + timestep;
        let epsilon = 1e-9 * timestep;

        let mut delta = Delta::new().value("time", timestep);
        for event in &self.config.events {
            if event.time >= now - epsilon && event.time < end - epsilon {
                for (path, value) in &event.set {
                    delta = delta.value(path.clone(), value.clone());
                }
            }
        }
        Ok(delta)
    }
}
