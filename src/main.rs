use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rayon::prelude::*;
use stdcm::run_scenario;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "stdcm",
    version,
    about = "Inserts a train path into an occupied timetable"
)]
struct Cli {
    /// Scenario files (TOML)
    #[arg(required = true)]
    scenarios: Vec<PathBuf>,

    /// Pretty-print the JSON reports
    #[arg(long)]
    pretty: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Solving {} scenarios", cli.scenarios.len());

    // Each scenario owns its own graph, they run independently
    let reports: Vec<_> = cli
        .scenarios
        .par_iter()
        .map(|path| run_scenario(path))
        .collect();

    let mut failed = false;
    for report in &reports {
        match report.to_json(cli.pretty) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to serialize report: {e}"),
        }
        if report.is_error() {
            failed = true;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
