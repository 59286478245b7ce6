//! Engine-agnostic desired cluster shape
//!
//! Every field is optional: `None` means the user did not ask for it, so a
//! create falls back to the version defaults and an edit leaves the stored
//! value alone.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use cron::Schedule;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::{AFFINITY_TOPOLOGY_KEY_OFF, DEFAULT_AFFINITY_TOPOLOGY_KEY};
use crate::error::{Error, Result};

use super::quantity;

/// Topology keys accepted for pod anti-affinity
pub const ALLOWED_AFFINITY_KEYS: &[&str] = &[
    AFFINITY_TOPOLOGY_KEY_OFF,
    DEFAULT_AFFINITY_TOPOLOGY_KEY,
    "failure-domain.beta.kubernetes.io/zone",
    "failure-domain.beta.kubernetes.io/region",
];

/// Name of the backup storage entry created from the S3 options
pub const DEFAULT_BACKUP_STORAGE_NAME: &str = "defaultS3Storage";

/// Desired configuration of a cluster
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterConfig {
    pub labels: Option<BTreeMap<String, String>>,
    /// Database nodes (PXC nodes or the MongoDB replica set)
    pub primary: ComponentConfig,
    /// Proxy nodes (ProxySQL); ignored by engines without a proxy tier
    pub proxy: ComponentConfig,
    pub replset_name: Option<String>,
    pub pmm: Option<PmmConfig>,
    pub backup_schedules: Option<Vec<BackupSchedule>>,
    /// Stop (`true`) or start (`false`) the cluster
    pub paused: Option<bool>,
}

/// Per-component sizing and placement
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentConfig {
    pub size: Option<i32>,
    pub request_cpu: Option<String>,
    pub request_mem: Option<String>,
    pub anti_affinity_key: Option<String>,
    pub storage_size: Option<String>,
    pub storage_class: Option<String>,
}

impl ComponentConfig {
    /// True when the user set any resource request explicitly
    pub fn has_requests(&self) -> bool {
        self.request_cpu.is_some() || self.request_mem.is_some()
    }

    fn validate(&self, component: &str) -> Result<()> {
        if let Some(size) = self.size {
            if size < 0 {
                return Err(Error::config(format!(
                    "{} instances must not be negative, got {}",
                    component, size
                )));
            }
        }
        if let Some(cpu) = &self.request_cpu {
            quantity::parse_positive(&format!("{} request-cpu", component), cpu)?;
        }
        if let Some(mem) = &self.request_mem {
            quantity::parse_positive(&format!("{} request-mem", component), mem)?;
        }
        if let Some(size) = &self.storage_size {
            quantity::parse_positive(&format!("{} storage-size", component), size)?;
        }
        if let Some(key) = &self.anti_affinity_key {
            if !ALLOWED_AFFINITY_KEYS.contains(&key.as_str()) {
                return Err(Error::config(format!(
                    "{} anti-affinity-key '{}' is not allowed. Allowed values: {}",
                    component,
                    key,
                    ALLOWED_AFFINITY_KEYS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Monitoring client configuration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PmmConfig {
    pub enabled: bool,
    pub image: Option<String>,
    pub server_host: Option<String>,
    pub server_user: Option<String>,
}

/// Cron-driven backup request
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct BackupSchedule {
    pub name: String,
    /// Standard five-field cron expression
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<i32>,
    /// Defaults to the storage created from the S3 options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl BackupSchedule {
    pub fn storage_name(&self) -> &str {
        self.storage.as_deref().unwrap_or(DEFAULT_BACKUP_STORAGE_NAME)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("backup schedule name must not be empty"));
        }
        let fields = self.schedule.split_whitespace().count();
        if fields != 5 {
            return Err(Error::config(format!(
                "backup schedule '{}': expected 5 cron fields, got {}",
                self.name, fields
            )));
        }
        // cron expects a leading seconds field
        Schedule::from_str(&format!("0 {}", self.schedule)).map_err(|e| {
            Error::config(format!(
                "backup schedule '{}': invalid cron expression '{}': {}",
                self.name, self.schedule, e
            ))
        })?;
        if let Some(keep) = self.keep {
            if keep < 1 {
                return Err(Error::config(format!(
                    "backup schedule '{}': keep must be at least 1",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Object storage destination for backups
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupStorageSpec {
    pub endpoint_url: Option<String>,
    pub bucket: String,
    pub region: String,
    /// Secret holding the access keys; provisioning it is the caller's job
    pub credentials_secret: String,
}

/// Platform the cluster runs on
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    #[default]
    Kubernetes,
    Openshift,
    Minikube,
    Minishift,
}

impl PlatformType {
    /// Single-node development platforms cannot honour anti-affinity or requests
    pub fn is_mini(self) -> bool {
        matches!(self, PlatformType::Minikube | PlatformType::Minishift)
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlatformType::Kubernetes => "kubernetes",
            PlatformType::Openshift => "openshift",
            PlatformType::Minikube => "minikube",
            PlatformType::Minishift => "minishift",
        };
        f.write_str(name)
    }
}

impl ClusterConfig {
    /// Validate everything that can be checked without a document
    pub fn validate(&self) -> Result<()> {
        self.primary.validate("primary")?;
        self.proxy.validate("proxy")?;

        if let Some(labels) = &self.labels {
            for (key, value) in labels {
                validate_label_token(key)?;
                validate_label_token(value)?;
            }
        }

        if let Some(name) = &self.replset_name {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(Error::config(format!("invalid replica set name '{}'", name)));
            }
        }

        if let Some(schedules) = &self.backup_schedules {
            for schedule in schedules {
                schedule.validate()?;
            }
        }

        Ok(())
    }
}

/// Parse `key1=value1,key2=value2` label syntax
pub fn parse_labels(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(label_syntax_error());
        };
        validate_label_token(key).map_err(|_| label_syntax_error())?;
        validate_label_token(value).map_err(|_| label_syntax_error())?;
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

fn validate_label_token(token: &str) -> Result<()> {
    let valid = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::config(format!("invalid label token '{}'", token)))
    }
}

fn label_syntax_error() -> Error {
    Error::config("Incorrect label format. Use key1=value1,key2=value2 syntax")
}
