use clap::{Args, Parser, Subcommand, ValueEnum};

/// Tributary scenario runner
///
/// Loads a YAML scenario describing vaults, swap venues, AutoBalancers and pipelines, then runs
/// its steps, each inside its own unit of work against an in-memory value store.
#[derive(Parser, PartialEq, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    global_args: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn args(&self) -> GlobalArgs {
        self.global_args.clone()
    }

    pub fn command(&self) -> Command {
        self.command.clone()
    }
}

#[derive(Subcommand, Clone, PartialEq, Debug)]
pub enum Command {
    /// Runs every step of a scenario and prints the outcome.
    Run(RunArgs),
    /// Prints the component tree of every pipeline and AutoBalancer in a scenario.
    Describe(ScenarioArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Enable debug logging. `RUST_LOG` takes precedence when set.
    #[clap(long, global = true)]
    pub verbose: bool,

    /// Log line format, logs are written to stderr.
    #[clap(long, value_enum, default_value = "compact", global = true)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ScenarioArgs {
    /// Path to the scenario file
    #[clap(long, env = "TRIBUTARY_SCENARIO")]
    pub scenario: String,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    #[clap(flatten)]
    pub scenario: ScenarioArgs,

    /// Print the run report as JSON instead of text.
    #[clap(long)]
    pub json: bool,
}
