use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "fleetctl",
    about = "fleetroll: validate and simulate rolling machine-image deployments",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a deployment config, then print it resolved.
    Validate {
        /// Deployment config (.yaml, .yml, .toml or .json)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a deployment against a simulated in-memory fleet.
    ///
    /// The fleet fixture is a JSON document with `groups`,
    /// `launch_configs`, `instances` and an optional `refresh_script`.
    Simulate {
        /// Deployment config (.yaml, .yml, .toml or .json)
        #[arg(short, long)]
        config: PathBuf,
        /// Fleet fixture (JSON)
        #[arg(short, long)]
        fleet: PathBuf,
        /// Skip real sleeps between retries and polls.
        #[arg(long)]
        instant: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Validate { config } => commands::validate::validate(&config),
        Commands::Simulate {
            config,
            fleet,
            instant,
        } => commands::simulate::simulate(&config, &fleet, instant).await,
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,fleetroll=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
