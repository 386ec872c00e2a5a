use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Cli, Command, GlobalArgs, LogFormat, RunArgs, ScenarioArgs},
    runner::Runner,
    scenario::Scenario,
};

mod cli;
mod report;
mod runner;
mod scenario;

fn main() -> Result<(), anyhow::Error> {
    let cli: Cli = Cli::parse();
    create_tracing_subscriber(&cli.args())?;
    match cli.command() {
        Command::Run(run_args) => run(run_args)?,
        Command::Describe(scenario_args) => describe(scenario_args)?,
    };
    Ok(())
}

/// Logs go to stderr so that stdout only carries the report.
fn create_tracing_subscriber(args: &GlobalArgs) -> anyhow::Result<()> {
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Compact => builder
            .with_level(true)
            .with_target(false)
            .compact()
            .try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("Failed to set up logging subscriber: {e}"))
}

fn load(args: &ScenarioArgs) -> anyhow::Result<Runner> {
    let scenario = Scenario::from_yaml(&args.scenario)?;
    Runner::new(scenario).with_context(|| format!("Failed to set up scenario {}", args.scenario))
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut runner = load(&args.scenario)?;
    let report = runner.run();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    match report.failed_steps() {
        0 => info!(steps = report.steps.len(), "Scenario finished"),
        failed => warn!(steps = report.steps.len(), failed, "Scenario finished with failed steps"),
    }
    Ok(())
}

fn describe(args: ScenarioArgs) -> anyhow::Result<()> {
    let runner = load(&args)?;
    for (name, info) in runner.describe() {
        println!("{name}");
        print!("{info}");
        println!();
    }
    Ok(())
}
