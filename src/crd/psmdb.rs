//! PerconaServerMongoDB document

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{
    BackupStorage, Extra, PmmSpec, PodAffinity, PodDisruptionBudgetSpec, PodResources, VolumeSpec,
};

/// Replica set name used when none is requested
pub const DEFAULT_REPLSET_NAME: &str = "rs0";

/// PerconaServerMongoDB resource
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDB {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PerconaServerMongoDBSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Desired state of a PerconaServerMongoDB cluster
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDBSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<PsmdbSecrets>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replsets: Vec<ReplsetSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmm: Option<PmmSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PsmdbBackupSpec>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl PerconaServerMongoDBSpec {
    /// Replica set with the given name, if present
    pub fn replset_mut(&mut self, name: &str) -> Option<&mut ReplsetSpec> {
        self.replsets.iter_mut().find(|rs| rs.name == name)
    }
}

/// Secret references
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PsmdbSecrets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Replica set pod group
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplsetSpec {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<PodResources>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_spec: Option<VolumeSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<PodAffinity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PodDisruptionBudgetSpec>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Backup agent settings
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PsmdbBackupSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storages: Option<BTreeMap<String, BackupStorage>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<PsmdbBackupTask>>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Cron-driven backup task
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PsmdbBackupTask {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    pub schedule: String,

    pub storage_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<i32>,

    #[serde(flatten)]
    pub extra: Extra,
}
