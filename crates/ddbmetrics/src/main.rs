//! ddbmetrics operator CLI
//!
//! Checkpoint administration, collection status and a summary of the metrics
//! collected so far. Collection runs themselves are driven by the embedding
//! service through `ddbmetrics_collector::StreamingCollector`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ddbmetrics::AppConfig;
use ddbmetrics_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "ddbmetrics", about = "Resumable DynamoDB metrics collection tooling")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: <home>/config.toml)
    #[arg(long, global = true, env = "DDBMETRICS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage operation checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: cli::checkpoint::CheckpointAction,
    },

    /// Show progress of a collection operation
    Status {
        /// Operation id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize collected metrics in the metric store
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn run_command(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Checkpoint { action } => cli::checkpoint::run(action, &config),
        Commands::Status { id, json } => cli::status::run(&id, json, &config),
        Commands::Summary { json } => cli::summary::run(json, &config),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig::new("ddbmetrics", cli.verbose)) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
