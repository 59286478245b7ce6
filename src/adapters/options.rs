//! User-facing options and the operation request file

use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::Engine;
use crate::error::{Error, Result};

use super::cluster_config::{
    parse_labels, BackupSchedule, BackupStorageSpec, ClusterConfig, ComponentConfig, PlatformType,
    PmmConfig,
};

/// Raw option strings as a user supplies them
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClusterOptions {
    /// Storage size of the database nodes (e.g. `6G`)
    pub storage_size: Option<String>,
    pub storage_class: Option<String>,

    pub pxc_instances: Option<i32>,
    pub pxc_request_cpu: Option<String>,
    pub pxc_request_mem: Option<String>,
    pub pxc_anti_affinity_key: Option<String>,

    pub proxy_instances: Option<i32>,
    pub proxy_request_cpu: Option<String>,
    pub proxy_request_mem: Option<String>,
    pub proxy_anti_affinity_key: Option<String>,

    pub replset_name: Option<String>,
    pub replset_size: Option<i32>,
    /// Requests and placement of engines with a single node group
    pub request_cpu: Option<String>,
    pub request_mem: Option<String>,
    pub anti_affinity_key: Option<String>,

    pub s3_endpoint_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_credentials_secret: Option<String>,

    pub pmm_enabled: Option<bool>,
    pub pmm_image: Option<String>,
    pub pmm_server_host: Option<String>,
    pub pmm_server_user: Option<String>,

    /// `key1=value1,key2=value2`
    pub labels: Option<String>,
    pub backup_schedules: Option<Vec<BackupSchedule>>,
    pub paused: Option<bool>,
}

impl ClusterOptions {
    /// Translate into a validated [`ClusterConfig`]
    pub fn translate(&self) -> Result<ClusterConfig> {
        let labels = match non_empty(&self.labels) {
            Some(raw) => Some(parse_labels(raw)?),
            None => None,
        };

        let primary = ComponentConfig {
            size: self.pxc_instances.or(self.replset_size),
            request_cpu: first_set(&self.pxc_request_cpu, &self.request_cpu),
            request_mem: first_set(&self.pxc_request_mem, &self.request_mem),
            anti_affinity_key: first_set(&self.pxc_anti_affinity_key, &self.anti_affinity_key),
            storage_size: non_empty(&self.storage_size).map(str::to_string),
            storage_class: non_empty(&self.storage_class).map(str::to_string),
        };

        let proxy = ComponentConfig {
            size: self.proxy_instances,
            request_cpu: non_empty(&self.proxy_request_cpu).map(str::to_string),
            request_mem: non_empty(&self.proxy_request_mem).map(str::to_string),
            anti_affinity_key: non_empty(&self.proxy_anti_affinity_key).map(str::to_string),
            ..Default::default()
        };

        let pmm_requested = self.pmm_enabled.is_some()
            || self.pmm_image.is_some()
            || self.pmm_server_host.is_some()
            || self.pmm_server_user.is_some();
        let pmm = pmm_requested.then(|| PmmConfig {
            enabled: self.pmm_enabled.unwrap_or(true),
            image: non_empty(&self.pmm_image).map(str::to_string),
            server_host: non_empty(&self.pmm_server_host).map(str::to_string),
            server_user: non_empty(&self.pmm_server_user).map(str::to_string),
        });

        let config = ClusterConfig {
            labels,
            primary,
            proxy,
            replset_name: non_empty(&self.replset_name).map(str::to_string),
            pmm,
            backup_schedules: self.backup_schedules.clone(),
            paused: self.paused,
        };
        config.validate()?;
        Ok(config)
    }

    /// Backup storage from the `s3-*` options
    ///
    /// No S3 option at all means no storage. Once any is set, bucket, region
    /// and credentials secret are all required.
    pub fn backup_storage(&self) -> Result<Option<BackupStorageSpec>> {
        let bucket = non_empty(&self.s3_bucket);
        let region = non_empty(&self.s3_region);
        let secret = non_empty(&self.s3_credentials_secret);
        let endpoint = non_empty(&self.s3_endpoint_url);

        if bucket.is_none() && region.is_none() && secret.is_none() && endpoint.is_none() {
            return Ok(None);
        }

        let missing: Vec<&str> = [
            ("s3-bucket", bucket),
            ("s3-region", region),
            ("s3-credentials-secret", secret),
        ]
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(flag, _)| *flag)
        .collect();

        match (bucket, region, secret) {
            (Some(bucket), Some(region), Some(secret)) => Ok(Some(BackupStorageSpec {
                endpoint_url: endpoint.map(str::to_string),
                bucket: bucket.to_string(),
                region: region.to_string(),
                credentials_secret: secret.to_string(),
            })),
            _ => Err(Error::config(format!(
                "incomplete backup storage, missing: {}",
                missing.join(", ")
            ))),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn first_set(preferred: &Option<String>, fallback: &Option<String>) -> Option<String> {
    non_empty(preferred)
        .or_else(|| non_empty(fallback))
        .map(str::to_string)
}

/// Lifecycle operation kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Edit,
    Upgrade,
    Delete,
    Backup,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Edit => "edit",
            Operation::Upgrade => "upgrade",
            Operation::Delete => "delete",
            Operation::Backup => "backup",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle request, as read from a YAML file
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct OperationRequest {
    pub operation: Operation,

    pub engine: Engine,

    /// Operator version; empty or `default` selects the engine default
    #[serde(default)]
    pub version: String,

    /// Cluster name
    pub name: String,

    #[serde(default)]
    pub platform: PlatformType,

    #[serde(default)]
    pub options: ClusterOptions,

    /// Upgrade target; derives per-component images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,

    /// Explicit per-component images (`primary`, `proxy`, `backup`, `operator`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<String, String>,

    /// Operator image used when rendering the bundle on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_image: Option<String>,

    /// Storage a backup is written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_storage: Option<String>,

    /// Backup object name; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,

    /// Delete persistent volumes together with the cluster
    #[serde(default)]
    pub clear_data: bool,
}

impl OperationRequest {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let request: OperationRequest = serde_yaml::from_str(raw)?;
        if request.name.trim().is_empty() {
            return Err(Error::config("cluster name must not be empty"));
        }
        Ok(request)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_maps_pxc_options() {
        let options = ClusterOptions {
            storage_size: Some("10G".to_string()),
            pxc_instances: Some(5),
            proxy_request_mem: Some("512M".to_string()),
            labels: Some("team=db".to_string()),
            ..Default::default()
        };
        let config = options.translate().unwrap();
        assert_eq!(config.primary.size, Some(5));
        assert_eq!(config.primary.storage_size.as_deref(), Some("10G"));
        assert_eq!(config.proxy.request_mem.as_deref(), Some("512M"));
        assert_eq!(config.labels.unwrap()["team"], "db");
        assert!(config.pmm.is_none());
    }

    #[test]
    fn translate_uses_generic_options_for_single_group_engines() {
        let options = ClusterOptions {
            replset_size: Some(3),
            request_cpu: Some("300m".to_string()),
            anti_affinity_key: Some("none".to_string()),
            ..Default::default()
        };
        let config = options.translate().unwrap();
        assert_eq!(config.primary.size, Some(3));
        assert_eq!(config.primary.request_cpu.as_deref(), Some("300m"));
        assert_eq!(config.primary.anti_affinity_key.as_deref(), Some("none"));
    }

    #[test]
    fn translate_rejects_bad_input() {
        let bad_size = ClusterOptions {
            storage_size: Some("6 GB".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_size.translate(), Err(Error::ConfigInvalid(_))));

        let bad_labels = ClusterOptions {
            labels: Some("team:db".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_labels.translate(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn backup_storage_is_all_or_nothing() {
        assert_eq!(ClusterOptions::default().backup_storage().unwrap(), None);

        let partial = ClusterOptions {
            s3_bucket: Some("backups".to_string()),
            ..Default::default()
        };
        let err = partial.backup_storage().unwrap_err().to_string();
        assert!(err.contains("s3-region"));
        assert!(err.contains("s3-credentials-secret"));

        let full = ClusterOptions {
            s3_bucket: Some("backups".to_string()),
            s3_region: Some("us-east-1".to_string()),
            s3_credentials_secret: Some("s3-creds".to_string()),
            ..Default::default()
        };
        let storage = full.backup_storage().unwrap().unwrap();
        assert_eq!(storage.bucket, "backups");
        assert_eq!(storage.endpoint_url, None);
    }

    #[test]
    fn request_parses_from_yaml() {
        let raw = r#"
operation: create
engine: pxc
version: 1.4.0
name: orders
platform: minikube
options:
  pxc-instances: 3
  storage-size: 6G
images:
  backup: custom/backup:1
"#;
        let request = OperationRequest::from_yaml_str(raw).unwrap();
        assert_eq!(request.operation, Operation::Create);
        assert_eq!(request.engine, Engine::Pxc);
        assert_eq!(request.platform, PlatformType::Minikube);
        assert_eq!(request.options.pxc_instances, Some(3));
        assert_eq!(request.images["backup"], "custom/backup:1");
        assert!(!request.clear_data);
    }

    #[test]
    fn request_requires_a_name() {
        let raw = "operation: delete\nengine: psmdb\nname: ''\n";
        assert!(OperationRequest::from_yaml_str(raw).is_err());
    }
}
