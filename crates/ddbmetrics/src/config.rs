//! Application configuration.
//!
//! All settings live in one TOML file, `<home>/config.toml` by default:
//!
//! ```toml
//! metrics_db_path = "/var/lib/ddbmetrics/metrics.db"
//!
//! [collector]
//! flush_threshold = 5000
//! max_concurrent_resources = 4
//!
//! [checkpoint]
//! dir = "/var/lib/ddbmetrics/checkpoints"
//! max_checkpoint_age_days = 14
//! ```
//!
//! Missing sections and keys fall back to defaults; a missing file means all
//! defaults.

use anyhow::{Context, Result};
use ddbmetrics_checkpoint::CheckpointConfig;
use ddbmetrics_collector::CollectorConfig;
use ddbmetrics_logging::{checkpoints_dir, ddbmetrics_home};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite file holding collected data points
    #[serde(default = "default_metrics_db_path")]
    pub metrics_db_path: PathBuf,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default = "default_checkpoint_config")]
    pub checkpoint: CheckpointConfig,
}

fn default_checkpoint_config() -> CheckpointConfig {
    CheckpointConfig::with_dir(checkpoints_dir())
}

fn default_metrics_db_path() -> PathBuf {
    ddbmetrics_home().join("metrics.db")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            metrics_db_path: default_metrics_db_path(),
            collector: CollectorConfig::default(),
            checkpoint: default_checkpoint_config(),
        }
    }
}

impl AppConfig {
    /// `<home>/config.toml`
    pub fn default_path() -> PathBuf {
        ddbmetrics_home().join("config.toml")
    }

    /// Load from `path`, or from [`AppConfig::default_path`] when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            metrics_db_path = "/tmp/m.db"

            [collector]
            flush_threshold = 500

            [checkpoint]
            dir = "/tmp/cp"
            "#,
        )
        .unwrap();

        assert_eq!(config.metrics_db_path, PathBuf::from("/tmp/m.db"));
        assert_eq!(config.collector.flush_threshold, 500);
        assert_eq!(config.collector.checkpoint_interval, 25);
        assert_eq!(config.checkpoint.dir, PathBuf::from("/tmp/cp"));
        assert!(config.checkpoint.enable_compression);
        assert_eq!(config.checkpoint.max_checkpoint_age_days, 7);
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.collector.flush_threshold, 10_000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let back = AppConfig::from_toml(&text).unwrap();
        assert_eq!(back.metrics_db_path, config.metrics_db_path);
        assert_eq!(back.checkpoint.dir, config.checkpoint.dir);
    }
}
