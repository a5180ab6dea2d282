//! Scenario runner: builds, runs and checks named scenarios.

use crate::error::SimError;
use crate::experiment::{Experiment, ExperimentConfig, CELLS, PHAGES};
use crate::processes::{DivideCondition, DivideConditionConfig, Growth, GrowthConfig};
use crate::scenarios::ScenarioId;
use phage_core::{Composite, Path, Topology, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Rounds executed
    pub total_rounds: u64,

    /// Final simulation time
    pub final_time: f64,

    /// Cells plus phages (free and assembled) at the end
    pub agent_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,
}

/// Runs scenarios against one experiment configuration.
pub struct ScenarioRunner {
    config: ExperimentConfig,
    duration: Option<f64>,
}

impl ScenarioRunner {
    /// Creates a runner with the default configuration and `seed`.
    pub fn new(seed: u64) -> Self {
        Self::with_config(ExperimentConfig {
            seed,
            ..Default::default()
        })
    }

    pub fn with_config(config: ExperimentConfig) -> Self {
        Self {
            config,
            duration: None,
        }
    }

    /// Overrides the cycle duration (defaults to `total_time`).
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.config.timestep = timestep;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Runs a scenario and returns the result. Engine errors become a
    /// failed result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let outcome = match scenario {
            ScenarioId::Growth => self.run_growth(),
            ScenarioId::Division => self.run_division(),
            ScenarioId::Attach => self.run_attach(),
            ScenarioId::Cycle => self.run_cycle(),
        };

        match outcome {
            Ok((experiment, rounds, failure)) => ScenarioResult {
                scenario,
                seed: self.config.seed,
                passed: failure.is_none(),
                total_rounds: rounds,
                final_time: experiment.time(),
                agent_count: count_agents(&experiment),
                failure_reason: failure,
            },
            Err(err) => ScenarioResult {
                scenario,
                seed: self.config.seed,
                passed: false,
                total_rounds: 0,
                final_time: 0.0,
                agent_count: 0,
                failure_reason: Some(err.to_string()),
            },
        }
    }

    /// One growth process over a single 10 s round.
    ///
    /// **Assertion**: `metabolites == 1.0 * exp(5e-4 * 10)`.
    fn run_growth(&self) -> Result<(Experiment, u64, Option<String>), SimError> {
        let rate = 5e-4;
        let timestep = 10.0;
        let composite = Composite::from_process(Arc::new(Growth::new(GrowthConfig {
            growth_rate: rate,
        })))
        .with_state(Value::from_pairs([("metabolites", 1.0)]));

        let config = ExperimentConfig {
            timestep,
            ..self.config.clone()
        };
        let mut experiment = Experiment::new(composite, &config)?;
        let rounds = experiment.update(timestep)?;

        let expected = (rate * timestep).exp();
        let actual = experiment.number("metabolites").unwrap_or(f64::NAN);
        debug!("metabolites={actual} expected={expected}");
        let failure = ((actual - expected).abs() > 1e-9)
            .then(|| format!("metabolites {actual} != {expected}"));
        Ok((experiment, rounds, failure))
    }

    /// A lone agent with `biomass = 2` and a split divider.
    ///
    /// **Assertion**: the mother is gone and both daughters hold 1.0.
    fn run_division(&self) -> Result<(Experiment, u64, Option<String>), SimError> {
        let process = DivideCondition::new(DivideConditionConfig {
            threshold: 2.0,
            ..Default::default()
        });
        let composite = Composite::new()
            .with_process(
                "divide_condition",
                Arc::new(process),
                Topology::new()
                    .with("variable", &["biomass"])
                    .with("agent", &[] as &[&str]),
            )?
            .with_state(Value::from_pairs([("biomass", 2.0)]))
            .nest(&Path::new([CELLS, "cell_0"]));

        let config = ExperimentConfig {
            timestep: 1.0,
            ..self.config.clone()
        };
        let mut experiment = Experiment::new(composite, &config)?;
        let rounds = experiment.update(1.0)?;

        let cells = experiment.agents(CELLS);
        let failure = if cells != ["cell_0_0", "cell_0_1"] {
            Some(format!("expected daughters cell_0_0 and cell_0_1, found {cells:?}"))
        } else {
            cells
                .iter()
                .map(|cell| experiment.number(&format!("{CELLS}/{cell}/biomass")))
                .find(|biomass| *biomass != Some(1.0))
                .map(|biomass| format!("daughter biomass {biomass:?} != 1.0"))
        };
        Ok((experiment, rounds, failure))
    }

    /// The phage is pointed at the host at t=1.
    ///
    /// **Assertion**: after the following round the host carries the phage
    /// gene and protein, runs an activation process and `attach` is false.
    fn run_attach(&self) -> Result<(Experiment, u64, Option<String>), SimError> {
        let config = ExperimentConfig {
            attach_time: Some(1.0),
            ..self.config.clone()
        };
        let cell = format!("{CELLS}/{}", config.cell_id);
        let phage = format!("{PHAGES}/{}", config.phage_id);

        let mut experiment = Experiment::new(config.cycle_composite()?, &config)?;
        let rounds = experiment.update(3.0)?;

        let activation = format!("{cell}/activation");
        let failure = if experiment.read(&format!("{cell}/genes/phage")).is_none() {
            Some("phage gene not inserted".to_string())
        } else if experiment.read(&format!("{cell}/proteins/phage/count")).is_none() {
            Some("phage protein not inserted".to_string())
        } else if !experiment.engine().process_ids().contains(&activation) {
            Some(format!("no process at {activation}"))
        } else if experiment.read(&format!("{phage}/attach")) != Some(Value::Bool(false)) {
            Some("attach was not reset".to_string())
        } else {
            None
        };
        Ok((experiment, rounds, failure))
    }

    /// Host, phage and timeline over `total_time`.
    ///
    /// **Assertion**: the host carries the phage gene and at least one
    /// phage has been assembled inside a cell.
    fn run_cycle(&self) -> Result<(Experiment, u64, Option<String>), SimError> {
        let config = &self.config;
        let duration = self.duration.unwrap_or(config.total_time);

        let mut experiment = Experiment::new(config.cycle_composite()?, config)?;
        let rounds = experiment.update(duration)?;

        let infected = experiment
            .agents(CELLS)
            .iter()
            .any(|cell| experiment.read(&format!("{CELLS}/{cell}/genes/phage")).is_some());
        let assembled = assembled_phages(&experiment);
        info!("Cycle finished: {} cells, {} assembled phages", experiment.agents(CELLS).len(), assembled);

        let failure = if config.attach_time.map_or(true, |t| t >= duration) {
            None
        } else if !infected {
            Some("no cell carries the phage gene".to_string())
        } else if assembled == 0 {
            Some("no phage assembled".to_string())
        } else {
            None
        };
        Ok((experiment, rounds, failure))
    }
}

fn assembled_phages(experiment: &Experiment) -> usize {
    experiment
        .agents(CELLS)
        .iter()
        .map(|cell| experiment.agents(&format!("{CELLS}/{cell}/{PHAGES}")).len())
        .sum()
}

fn count_agents(experiment: &Experiment) -> usize {
    experiment.agents(CELLS).len() + experiment.agents(PHAGES).len() + assembled_phages(experiment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_scenario_passes() {
        let result = ScenarioRunner::new(1).run(ScenarioId::Growth);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_rounds, 1);
        assert_eq!(result.final_time, 10.0);
    }

    #[test]
    fn test_engine_error_fails_scenario() {
        let result = ScenarioRunner::new(1).with_timestep(-1.0).run(ScenarioId::Cycle);
        assert!(!result.passed);
        assert!(result
            .failure_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("timestep")));
    }
}
