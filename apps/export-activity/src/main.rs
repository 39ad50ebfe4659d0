mod commands;
mod config;
mod file_source;
mod heartbeat_sink;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::RuntimeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "export-activity", version, about = "Runs one Postgres batch-export activity attempt")]
struct Cli {
    #[command(subcommand)]
    command: SubCommand,

    /// Path(s) to a `PGEXPORT.toml`-shaped config file, layered over the
    /// built-in defaults and under `PGEXPORT_`-prefixed env vars.
    #[arg(long, global = true)]
    config: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Run one export activity attempt.
    Run(commands::run::Opts),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RuntimeConfig::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = pgexport_metrics::register_all() {
        tracing::warn!(error = %err, "failed to register metrics");
    }

    tracing::debug!(?config, "loaded runtime config");

    let records_completed = match &cli.command {
        SubCommand::Run(opts) => opts.execute(config).await?,
    };

    tracing::info!(records_completed, "done");
    Ok(())
}
