//! `securefield-sim`: run one secure-field scenario and log what happened.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use securefield_cli::{CliError, Scenario, ScenarioConfig, run_scenario};
use securefield_core::SystemEnv;
use securefield_harness::SimEnv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "securefield-sim", version, about = "Run secure card-field scenarios")]
struct Args {
    /// Flow to run.
    #[arg(long, value_enum, default_value = "happy")]
    scenario: Scenario,

    /// Seed for frame tokens.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// JSON file with element, card and input options.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wait out timeouts on the wall clock instead of a virtual one.
    #[arg(long)]
    real_time: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "scenario failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: &Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };

    let report = if args.real_time {
        run_scenario(SystemEnv, args.scenario, &config, args.seed).await?
    } else {
        run_scenario(SimEnv::new(), args.scenario, &config, args.seed).await?
    };

    let json = serde_json::to_string(&report).map_err(CliError::Report)?;
    info!(report = %json, "report");
    args.scenario.verify(&report)
}
