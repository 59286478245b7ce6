//! PerconaXtraDBCluster document

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{
    BackupStorage, Extra, PmmSpec, PodAffinity, PodDisruptionBudgetSpec, PodResources, VolumeSpec,
};

/// Finalizer the PXC operator uses to stop pods in order
pub const PXC_FINALIZER: &str = "delete-pxc-pods-in-order";

/// PerconaXtraDBCluster resource
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerconaXtraDBCluster {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PerconaXtraDBClusterSpec,

    /// Server-managed; never interpreted by builders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Desired state of a PerconaXtraDBCluster
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerconaXtraDBClusterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets_name: Option<String>,

    /// Stops the cluster while keeping its data (operator 1.4.0+)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pxc: Option<PxcPodSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxysql: Option<PxcPodSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmm: Option<PmmSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PxcBackupSpec>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// PXC or ProxySQL pod group
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PxcPodSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

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

/// Scheduled and on-demand backup settings
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PxcBackupSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<PxcBackupSchedule>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storages: Option<BTreeMap<String, BackupStorage>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Cron-driven backup
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PxcBackupSchedule {
    pub name: String,

    pub schedule: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<i32>,

    pub storage_name: String,

    #[serde(flatten)]
    pub extra: Extra,
}
