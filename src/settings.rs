//! Engine settings

use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::reconcilers::WatermarkPolicy;

pub const ENV_POLL_INTERVAL_MS: &str = "DBAAS_POLL_INTERVAL_MS";
pub const ENV_MAX_POLL_ATTEMPTS: &str = "DBAAS_MAX_POLL_ATTEMPTS";
pub const ENV_SETTLE_DELAY_MS: &str = "DBAAS_SETTLE_DELAY_MS";
pub const ENV_NAMESPACE: &str = "DBAAS_NAMESPACE";

/// Tunables of the reconciliation loop
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Delay between two status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polls before an operation gives up
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Wait after submission before the first poll
    #[serde(default)]
    pub settle_delay_ms: u64,

    /// Buffered progress events per operation
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,

    #[serde(default)]
    pub watermark_policy: WatermarkPolicy,

    /// Namespace clusters live in
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_poll_attempts() -> u32 {
    1200
}

fn default_progress_capacity() -> usize {
    64
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            settle_delay_ms: 0,
            progress_capacity: default_progress_capacity(),
            watermark_policy: WatermarkPolicy::default(),
            namespace: default_namespace(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let settings: EngineSettings = serde_yaml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults overridden by `DBAAS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_number(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_POLL_ATTEMPTS) {
            self.max_poll_attempts = parse_number(ENV_MAX_POLL_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SETTLE_DELAY_MS) {
            self.settle_delay_ms = parse_number(ENV_SETTLE_DELAY_MS, &raw)?;
        }
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            if namespace.trim().is_empty() {
                warn!("{} is empty, keeping '{}'", ENV_NAMESPACE, self.namespace);
            } else {
                self.namespace = namespace.trim().to_string();
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::config("pollIntervalMs must be greater than 0"));
        }
        if self.max_poll_attempts == 0 {
            return Err(Error::config("maxPollAttempts must be greater than 0"));
        }
        if self.progress_capacity == 0 {
            return Err(Error::config("progressCapacity must be greater than 0"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::config(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}
