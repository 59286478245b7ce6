//! Document edits shared by every builder version

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::adapters::{quantity, BackupStorageSpec, ComponentConfig};
use crate::crd::{
    BackupStorage, PodAffinity, PodResources, ResourceList, S3StorageSpec, VolumeSpec,
    AFFINITY_TOPOLOGY_KEY_OFF,
};
use crate::error::{Error, Result};

/// Mutable view of one pod group, whatever the engine calls it
pub(crate) struct PodGroup<'a> {
    pub size: &'a mut Option<i32>,
    pub resources: &'a mut Option<PodResources>,
    pub volume_spec: &'a mut Option<VolumeSpec>,
    pub affinity: &'a mut Option<PodAffinity>,
}

impl PodGroup<'_> {
    /// Apply every field set in `config`, keeping the rest
    pub fn apply(&mut self, config: &ComponentConfig) -> Result<()> {
        if let Some(size) = config.size {
            *self.size = Some(size);
        }

        if config.has_requests() {
            let requests = self
                .resources
                .get_or_insert_with(PodResources::default)
                .requests
                .get_or_insert_with(ResourceList::default);
            if let Some(cpu) = &config.request_cpu {
                requests.cpu = Some(quantity::parse_positive("request-cpu", cpu)?.0);
            }
            if let Some(mem) = &config.request_mem {
                requests.memory = Some(quantity::parse_positive("request-mem", mem)?.0);
            }
        }

        if let Some(key) = &config.anti_affinity_key {
            self.affinity
                .get_or_insert_with(PodAffinity::default)
                .anti_affinity_topology_key = Some(key.clone());
        }

        let volume = self.volume_spec.get_or_insert_with(VolumeSpec::default);
        match (&config.storage_size, &config.storage_class) {
            (Some(size), class) => {
                let size = quantity::parse_positive("storage-size", size)?;
                volume.set_storage(size, class.clone());
            }
            (None, Some(class)) => volume.set_storage_class(class.clone()),
            (None, None) => {}
        }
        if *volume == VolumeSpec::default() {
            *self.volume_spec = None;
        }

        Ok(())
    }

    /// Single-node platforms: no anti-affinity and no requests unless asked for
    pub fn relax_for_mini_platform(&mut self, config: &ComponentConfig) {
        if config.anti_affinity_key.is_none() {
            self.affinity
                .get_or_insert_with(PodAffinity::default)
                .anti_affinity_topology_key = Some(AFFINITY_TOPOLOGY_KEY_OFF.to_string());
        }
        if !config.has_requests() {
            *self.resources = None;
        }
    }

    /// Fail early on quantities the API server would reject
    pub fn check_quantities(&self, group: &str) -> Result<()> {
        if let Some(requests) = self.resources.as_ref().and_then(|r| r.requests.as_ref()) {
            if let Some(cpu) = &requests.cpu {
                quantity::parse(cpu).map_err(|e| field_error(group, "resources.requests.cpu", e))?;
            }
            if let Some(memory) = &requests.memory {
                quantity::parse(memory)
                    .map_err(|e| field_error(group, "resources.requests.memory", e))?;
            }
        }
        if let Some(size) = self.volume_spec.as_ref().and_then(VolumeSpec::storage_request) {
            quantity::parse(&size.0)
                .map_err(|e| field_error(group, "volumeSpec storage request", e))?;
        }
        Ok(())
    }
}

fn field_error(group: &str, field: &str, err: Error) -> Error {
    let reason = match err {
        Error::ConfigInvalid(msg) => msg,
        other => other.to_string(),
    };
    Error::config(format!("{} {}: {}", group, field, reason))
}

/// Backup storage entry pointing at an S3 bucket
pub(crate) fn s3_storage(spec: &BackupStorageSpec) -> BackupStorage {
    BackupStorage {
        type_: "s3".to_string(),
        s3: Some(S3StorageSpec {
            bucket: spec.bucket.clone(),
            credentials_secret: spec.credentials_secret.clone(),
            region: Some(spec.region.clone()),
            endpoint_url: spec.endpoint_url.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Readable form of a disruption budget value
pub(crate) fn int_or_string(value: &Option<IntOrString>) -> String {
    match value {
        Some(IntOrString::Int(n)) => n.to_string(),
        Some(IntOrString::String(s)) => s.clone(),
        None => "none".to_string(),
    }
}
