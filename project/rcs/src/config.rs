use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Tuning knobs for the replication manager. Deserializable from YAML;
/// every field falls back to its default when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// Number of parallel reconcile workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Age after which pending expectations are treated as satisfied.
    #[serde(default = "default_expectations_ttl_secs")]
    pub expectations_ttl_secs: u64,

    /// Maximum creates or deletes issued within a single reconcile.
    #[serde(default = "default_burst_replicas")]
    pub burst_replicas: usize,

    /// Interval at which every known controller key is re-enqueued.
    #[serde(default = "default_reconcile_period_secs")]
    pub reconcile_period_secs: u64,
}

fn default_worker_count() -> usize {
    1
}

fn default_expectations_ttl_secs() -> u64 {
    5 * 60
}

fn default_burst_replicas() -> usize {
    500
}

fn default_reconcile_period_secs() -> u64 {
    30
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            expectations_ttl_secs: default_expectations_ttl_secs(),
            burst_replicas: default_burst_replicas(),
            reconcile_period_secs: default_reconcile_period_secs(),
        }
    }
}

impl ReplicationConfig {
    pub fn expectations_ttl(&self) -> Duration {
        Duration::from_secs(self.expectations_ttl_secs)
    }

    pub fn reconcile_period(&self) -> Duration {
        Duration::from_secs(self.reconcile_period_secs)
    }
}

pub fn load_config(path: &str) -> anyhow::Result<ReplicationConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: ReplicationConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
