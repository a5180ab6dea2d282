//! Phage-cycle scenario CLI
//!
//! Runs the named scenarios and reports pass/fail.

use clap::Parser;
use phage_sim::{ExperimentConfig, ScenarioId, ScenarioResult, ScenarioRunner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Phage-cycle scenario CLI
#[derive(Parser, Debug)]
#[command(name = "phage-sim")]
#[command(about = "Run phage-cycle simulation scenarios", long_about = None)]
struct Args {
    /// Scenario to run (growth, division, attach, cycle, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Seed for spawned agent identifiers
    #[arg(short, long)]
    seed: Option<u64>,

    /// Simulated duration of the cycle scenario
    #[arg(short, long)]
    duration: Option<f64>,

    /// Round length
    #[arg(short, long)]
    timestep: Option<f64>,

    /// Experiment configuration (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: growth, division, attach, cycle, all");
                std::process::exit(1);
            }
        }
    };

    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => ExperimentConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(timestep) = args.timestep {
        config.timestep = timestep;
    }

    let mut runner = ScenarioRunner::with_config(config);
    if let Some(duration) = args.duration {
        runner = runner.with_duration(duration);
    }

    if !args.json {
        info!("Phage-cycle simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    let results: Vec<ScenarioResult> = scenarios
        .iter()
        .map(|scenario| {
            let result = runner.run(*scenario);
            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} PASSED ({} rounds, t={:.2}, {} agents)",
                        scenario.name(),
                        result.total_rounds,
                        result.final_time,
                        result.agent_count
                    );
                } else {
                    error!(
                        "✗ {} FAILED: {}",
                        scenario.name(),
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            result
        })
        .collect();

    let total = results.len();
    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "rounds": r.total_rounds,
                    "time": r.final_time,
                    "agents": r.agent_count,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{:#}", summary);
    } else if failed == 0 {
        info!("All {} scenarios passed", total);
    } else {
        error!("{}/{} scenarios failed", failed, total);
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
