//! Named end-to-end scenarios.

use crate::error::SimError;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// One growth process, one round
    Growth,

    /// Threshold division of a single agent
    Division,

    /// Timeline-driven phage attachment and genome insertion
    Attach,

    /// Full lysogenic cycle: host, phage, attachment and phage assembly
    Cycle,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Growth,
            ScenarioId::Division,
            ScenarioId::Attach,
            ScenarioId::Cycle,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Growth => "growth",
            ScenarioId::Division => "division",
            ScenarioId::Attach => "attach",
            ScenarioId::Cycle => "cycle",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Growth => "metabolites=1, rate=5e-4, dt=10: one round lands on exp(5e-3)",
            ScenarioId::Division => "biomass=2 with split divider divides into two halves at threshold 2",
            ScenarioId::Attach => "attach set by timeline inserts phage gene and activation into the host",
            ScenarioId::Cycle => "host grows, phage attaches, phage protein assembles progeny",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "growth" => Ok(ScenarioId::Growth),
            "division" | "divide" => Ok(ScenarioId::Division),
            "attach" | "insertion" => Ok(ScenarioId::Attach),
            "cycle" | "phage_cycle" => Ok(ScenarioId::Cycle),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}
