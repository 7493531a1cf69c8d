//! Logging setup shared by ddbmetrics binaries.
//!
//! Two `tracing` layers: a size-rotated log file (`<home>/logs/<app>.log` by
//! default) and stderr. `RUST_LOG` overrides the default filter for both; stderr
//! only shows warnings unless `verbose` is set.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod rotate;

pub use rotate::SizeRotatingFile;

const LOGGED_CRATES: &[&str] = &[
    "ddbmetrics",
    "ddbmetrics_collector",
    "ddbmetrics_checkpoint",
    "ddbmetrics_store",
];

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
    /// Defaults to [`logs_dir`]
    pub log_dir: Option<PathBuf>,
    pub max_files: usize,
    pub max_file_bytes: u64,
}

impl<'a> LogConfig<'a> {
    pub fn new(app_name: &'a str, verbose: bool) -> Self {
        Self {
            app_name,
            verbose,
            log_dir: None,
            max_files: 5,
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

/// `info` for every ddbmetrics crate.
pub fn default_filter() -> String {
    LOGGED_CRATES
        .iter()
        .map(|krate| format!("{}=info", krate))
        .collect::<Vec<_>>()
        .join(",")
}

fn env_or_default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = config.log_dir.clone().unwrap_or_else(logs_dir);
    let file = SizeRotatingFile::open(&dir, config.app_name, config.max_files, config.max_file_bytes)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    let console_filter = if config.verbose {
        env_or_default_filter()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(env_or_default_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(())
}

/// `$DDBMETRICS_HOME`, else `~/.ddbmetrics`.
pub fn ddbmetrics_home() -> PathBuf {
    match std::env::var_os("DDBMETRICS_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ddbmetrics"),
    }
}

pub fn logs_dir() -> PathBuf {
    ddbmetrics_home().join("logs")
}

pub fn checkpoints_dir() -> PathBuf {
    ddbmetrics_home().join("checkpoints")
}
