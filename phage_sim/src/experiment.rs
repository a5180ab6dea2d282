//! Experiment driver: wraps an engine with a recording emitter and builds
//! the phage-cycle composite from configuration.

use crate::composites::{Cell, CellConfig, Phage, PhageConfig};
use crate::error::SimError;
use crate::processes::{Timeline, TimelineConfig, TimelineEvent};
use phage_core::{Composer, Composite, Engine, EngineConfig, Path, SetConflictPolicy, Value};
use phage_env::{EmitRecord, Emitter, IdSource, LogEmitter, RamEmitter, SeededIds, Timeseries};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Collection holding cell agents.
pub const CELLS: &str = "cells";

/// Collection holding free phages.
pub const PHAGES: &str = "phages";

/// Experiment configuration.
///
/// Every field has a default, so a JSON file may supply any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Seed for spawned agent identifiers
    pub seed: u64,

    /// Round length
    pub timestep: f64,

    /// Simulated time to run
    pub total_time: f64,

    pub parallel: bool,
    pub set_conflict: SetConflictPolicy,

    /// Host parameters; the default raises the division threshold so the
    /// host is still whole when the phage attaches
    pub cell: CellConfig,
    pub phage: PhageConfig,
    pub cell_id: String,
    pub phage_id: String,

    /// When the phage is told to attach to `cell_id`; `None` leaves it free
    pub attach_time: Option<f64>,

    /// Also forward emitted records to the log
    pub log_emits: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let mut cell = CellConfig::default();
        cell.growth.growth_rate = 1e-4;
        cell.divide_condition.threshold = 1000.0;
        Self {
            seed: 42,
            timestep: 1.0,
            total_time: 30.0,
            parallel: true,
            set_conflict: SetConflictPolicy::Error,
            cell,
            phage: PhageConfig::default(),
            cell_id: "cell_0".to_string(),
            phage_id: "phage_0".to_string(),
            attach_time: Some(10.0),
            log_emits: false,
        }
    }
}

impl ExperimentConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimError::ConfigIo {
            path: path.to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            timestep: self.timestep,
            parallel: self.parallel,
            set_conflict: self.set_conflict,
            ..EngineConfig::default()
        }
    }

    pub fn ids(&self) -> Arc<dyn IdSource> {
        SeededIds::shared(self.seed)
    }

    /// One cell under `cells/<cell_id>`.
    pub fn cell_composite(&self) -> Result<Composite, SimError> {
        let at = Path::new([CELLS, self.cell_id.as_str()]);
        Ok(Cell::new(self.cell.clone()).generate()?.nest(&at))
    }

    /// A cell, a free phage under `phages/<phage_id>` and, if `attach_time`
    /// is set, a timeline that points the phage at the cell.
    pub fn cycle_composite(&self) -> Result<Composite, SimError> {
        let mut composite = self.cell_composite()?;

        let at = Path::new([PHAGES, self.phage_id.as_str()]);
        let phage = Phage::new(self.phage.clone(), self.ids()).generate()?.nest(&at);
        composite.merge(phage)?;

        if let Some(time) = self.attach_time {
            let event = TimelineEvent::new(time)
                .with(at.child("attach").to_string(), self.cell_id.as_str());
            composite.merge(Timeline::composite(TimelineConfig {
                events: vec![event],
                ..Default::default()
            })?)?;
        }
        Ok(composite)
    }
}

/// Keeps every record in memory and optionally mirrors it to the log.
#[derive(Debug)]
struct Recorder {
    ram: Arc<RamEmitter>,
    log: Option<LogEmitter>,
}

impl Emitter for Recorder {
    fn emit(&self, record: EmitRecord) {
        if let Some(log) = &self.log {
            log.emit(record.clone());
        }
        self.ram.emit(record);
    }
}

/// A running experiment.
pub struct Experiment {
    engine: Engine,
    records: Arc<RamEmitter>,
}

impl Experiment {
    /// Builds the engine for `composite`. The initial tree is emitted
    /// immediately.
    pub fn new(composite: Composite, config: &ExperimentConfig) -> Result<Self, SimError> {
        let records = RamEmitter::shared();
        let recorder = Recorder {
            ram: Arc::clone(&records),
            log: config.log_emits.then_some(LogEmitter),
        };
        let engine = Engine::builder(composite)
            .config(config.engine_config())
            .emitter(Arc::new(recorder))
            .build()?;

        info!(
            "Experiment ready: {} processes, timestep {}",
            engine.process_ids().len(),
            config.timestep
        );
        Ok(Self { engine, records })
    }

    /// Advances simulated time by `total_time`; returns the rounds run.
    pub fn update(&mut self, total_time: f64) -> Result<u64, SimError> {
        let rounds = self.engine.advance(total_time)?;
        info!(
            "Advanced {} rounds to t={:.3} ({} processes)",
            rounds,
            self.engine.time(),
            self.engine.process_ids().len()
        );
        Ok(rounds)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn time(&self) -> f64 {
        self.engine.time()
    }

    /// Every emitted series keyed by `/`-joined path.
    pub fn timeseries(&self) -> Timeseries {
        self.records.timeseries()
    }

    pub fn records(&self) -> &RamEmitter {
        &self.records
    }

    /// Keys of the agents currently in `collection`.
    pub fn agents(&self, collection: &str) -> Vec<String> {
        self.engine.state().child_keys(&Path::parse(collection))
    }

    /// Reads a `/`-separated path.
    pub fn read(&self, path: &str) -> Option<Value> {
        self.engine.read(&Path::parse(path))
    }

    /// Reads a `/`-separated path as a number.
    pub fn number(&self, path: &str) -> Option<f64> {
        self.read(path).as_ref().and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_composite_layout() {
        let composite = ExperimentConfig::default().cycle_composite().unwrap();
        let keys: Vec<String> = composite.processes().map(|(k, _)| k.to_string()).collect();
        assert!(keys.contains(&"cells/cell_0/growth".to_string()));
        assert!(keys.contains(&"phages/phage_0/attachment".to_string()));
        assert!(keys.contains(&"timeline".to_string()));
    }

    #[test]
    fn test_no_timeline_without_attach_time() {
        let config = ExperimentConfig {
            attach_time: None,
            ..Default::default()
        };
        let composite = config.cycle_composite().unwrap();
        assert!(composite.processes().all(|(k, _)| k.to_string() != "timeline"));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"seed": 7, "cell": {"divide_condition": {"threshold": 50}}}"#)
                .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.cell.divide_condition.threshold, 50.0);
        assert_eq!(config.cell_id, "cell_0");
        assert_eq!(config.attach_time, Some(10.0));
    }

    #[test]
    fn test_missing_config_file() {
        let err = ExperimentConfig::from_file("/nonexistent/phage.json").unwrap_err();
        assert!(matches!(err, SimError::ConfigIo { .. }));
    }

    #[test]
    fn test_experiment_records_initial_emit() {
        let config = ExperimentConfig::default();
        let experiment = Experiment::new(config.cell_composite().unwrap(), &config).unwrap();
        let series = experiment.timeseries();
        assert_eq!(series["cells/cell_0/metabolites"].len(), 1);
        assert_eq!(experiment.agents(CELLS), vec!["cell_0".to_string()]);
    }
}
