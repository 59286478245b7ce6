//! Component shapes shared by both operators

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields a builder version does not model, carried verbatim across edits
pub type Extra = BTreeMap<String, Value>;

/// Anti-affinity topology key used when none is requested
pub const DEFAULT_AFFINITY_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Topology key value that disables anti-affinity
pub const AFFINITY_TOPOLOGY_KEY_OFF: &str = "none";

/// CPU and memory requests or limits
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Pod resource requirements
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Volume backing a component
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSpec>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl VolumeSpec {
    /// Persistent volume claim requesting `size` of storage
    pub fn claim(size: Quantity, storage_class: Option<String>) -> Self {
        let mut spec = VolumeSpec::default();
        spec.set_storage(size, storage_class);
        spec
    }

    /// Requested storage size, if a claim is configured
    pub fn storage_request(&self) -> Option<&Quantity> {
        self.persistent_volume_claim
            .as_ref()?
            .resources
            .as_ref()?
            .requests
            .as_ref()?
            .get("storage")
    }

    pub fn storage_class(&self) -> Option<&str> {
        self.persistent_volume_claim
            .as_ref()?
            .storage_class_name
            .as_deref()
    }

    /// Update the claim in place, keeping every other claim field
    pub fn set_storage(&mut self, size: Quantity, storage_class: Option<String>) {
        let claim = self
            .persistent_volume_claim
            .get_or_insert_with(PersistentVolumeClaimSpec::default);
        claim
            .resources
            .get_or_insert_with(Default::default)
            .requests
            .get_or_insert_with(BTreeMap::new)
            .insert("storage".to_string(), size);
        if storage_class.is_some() {
            claim.storage_class_name = storage_class;
        }
    }

    pub fn set_storage_class(&mut self, storage_class: String) {
        self.persistent_volume_claim
            .get_or_insert_with(PersistentVolumeClaimSpec::default)
            .storage_class_name = Some(storage_class);
    }
}

/// Pod anti-affinity settings
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodAffinity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_affinity_topology_key: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl PodAffinity {
    pub fn with_key(key: &str) -> Self {
        PodAffinity {
            anti_affinity_topology_key: Some(key.to_string()),
            ..Default::default()
        }
    }
}

/// Pod disruption budget settings
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudgetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrString>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl PodDisruptionBudgetSpec {
    pub fn max_unavailable(count: i32) -> Self {
        PodDisruptionBudgetSpec {
            max_unavailable: Some(IntOrString::Int(count)),
            ..Default::default()
        }
    }
}

/// Monitoring client settings
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PmmSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_user: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// S3-compatible bucket a backup storage points at
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3StorageSpec {
    pub bucket: String,

    pub credentials_secret: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(rename = "endpointUrl", skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Named backup destination
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorage {
    /// Storage type (s3, filesystem)
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeSpec>,

    #[serde(flatten)]
    pub extra: Extra,
}
