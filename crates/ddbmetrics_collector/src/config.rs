use ddbmetrics_protocol::defaults::{MAX_DATAPOINTS_PER_CALL, MAX_QUERIES_PER_BATCH};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Collector tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Buffered points that trigger a flush to the metric store
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Processed resources between checkpoint saves
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    #[serde(default = "default_max_concurrent_resources")]
    pub max_concurrent_resources: usize,

    #[serde(default = "default_resource_timeout_secs")]
    pub resource_timeout_secs: u64,

    /// Per remote call
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    /// Total attempts per remote call, first one included
    #[serde(default = "default_batch_retry_attempts")]
    pub batch_retry_attempts: u32,

    #[serde(default = "default_batch_retry_delay_ms")]
    pub batch_retry_delay_ms: u64,

    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_max_queries_per_batch")]
    pub max_queries_per_batch: usize,

    #[serde(default = "default_max_datapoints")]
    pub max_datapoints: u32,

    /// Pause before starting each resource
    #[serde(default)]
    pub rate_limit_delay_ms: u64,
}

fn default_flush_threshold() -> usize {
    10_000
}

fn default_checkpoint_interval() -> usize {
    25
}

fn default_max_concurrent_resources() -> usize {
    10
}

fn default_resource_timeout_secs() -> u64 {
    45
}

fn default_batch_timeout_secs() -> u64 {
    30
}

fn default_batch_retry_attempts() -> u32 {
    3
}

fn default_batch_retry_delay_ms() -> u64 {
    100
}

fn default_inter_batch_delay_ms() -> u64 {
    100
}

fn default_max_queries_per_batch() -> usize {
    MAX_QUERIES_PER_BATCH
}

fn default_max_datapoints() -> u32 {
    MAX_DATAPOINTS_PER_CALL
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            checkpoint_interval: default_checkpoint_interval(),
            max_concurrent_resources: default_max_concurrent_resources(),
            resource_timeout_secs: default_resource_timeout_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
            batch_retry_attempts: default_batch_retry_attempts(),
            batch_retry_delay_ms: default_batch_retry_delay_ms(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            max_queries_per_batch: default_max_queries_per_batch(),
            max_datapoints: default_max_datapoints(),
            rate_limit_delay_ms: 0,
        }
    }
}

impl CollectorConfig {
    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.batch_retry_delay_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: CollectorConfig = toml::from_str("flush_threshold = 50\n").unwrap();
        assert_eq!(config.flush_threshold, 50);
        assert_eq!(config.checkpoint_interval, 25);
        assert_eq!(config.max_queries_per_batch, 500);
        assert_eq!(config.max_datapoints, 100_800);
        assert_eq!(config.resource_timeout(), Duration::from_secs(45));
    }
}
