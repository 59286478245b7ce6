//! Builders for PerconaXtraDBCluster documents

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::{json, Value};

use crate::adapters::{BackupStorageSpec, ClusterConfig, PlatformType, DEFAULT_BACKUP_STORAGE_NAME};
use crate::crd::{
    Engine, PerconaXtraDBCluster, PmmSpec, PodAffinity, PodDisruptionBudgetSpec, PodResources,
    PxcBackupSchedule, PxcBackupSpec, PxcPodSpec, ResourceList, VolumeSpec,
    DEFAULT_AFFINITY_TOPOLOGY_KEY, PXC_FINALIZER,
};
use crate::error::{Error, Result};

use super::common::{s3_storage, PodGroup};
use super::describe::{document_state, is_multi_az};
use super::{
    decode_document, encode_patched, ClusterDescription, Component, ComponentDescription,
    ImageOverrides,
};
use super::ResourceSpecBuilder;

const IMAGE_REPOSITORY: &str = "percona/percona-xtradb-cluster-operator";

/// Supported PXC operator releases
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PxcVersion {
    V1_1_0,
    V1_4_0,
}

impl PxcVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            PxcVersion::V1_1_0 => "1.1.0",
            PxcVersion::V1_4_0 => "1.4.0",
        }
    }

    fn api_version(self) -> &'static str {
        match self {
            PxcVersion::V1_1_0 => "pxc.percona.com/v1-1-0",
            PxcVersion::V1_4_0 => "pxc.percona.com/v1-4-0",
        }
    }

    /// Tag suffixes of the pxc, proxysql and backup images
    fn image_suffixes(self) -> [&'static str; 3] {
        match self {
            PxcVersion::V1_1_0 => ["-pxc", "-proxysql", "-backup"],
            PxcVersion::V1_4_0 => ["-pxc8.0", "-proxysql", "-pxc8.0-backup"],
        }
    }

    fn supports_pause(self) -> bool {
        matches!(self, PxcVersion::V1_4_0)
    }
}

/// Builder for one PXC operator release
#[derive(Clone, Debug)]
pub struct PxcBuilder {
    version: PxcVersion,
}

impl PxcBuilder {
    pub fn new(version: PxcVersion) -> Self {
        Self { version }
    }

    fn images_for(&self, tag: &str) -> ImageOverrides {
        let [pxc, proxysql, backup] = self.version.image_suffixes();
        ImageOverrides::from([
            (Component::Primary, format!("{}:{}{}", IMAGE_REPOSITORY, tag, pxc)),
            (Component::Proxy, format!("{}:{}{}", IMAGE_REPOSITORY, tag, proxysql)),
            (Component::Backup, format!("{}:{}{}", IMAGE_REPOSITORY, tag, backup)),
        ])
    }

    fn default_image(&self, component: Component) -> Option<String> {
        self.default_images().remove(&component)
    }

    fn pod_group(&self, component: Component, size: i32, storage: &str) -> PxcPodSpec {
        PxcPodSpec {
            enabled: (component == Component::Proxy).then_some(true),
            size: Some(size),
            image: self.default_image(component),
            resources: Some(PodResources {
                requests: Some(ResourceList {
                    memory: Some("1G".to_string()),
                    cpu: Some("600m".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            volume_spec: Some(VolumeSpec::claim(Quantity(storage.to_string()), None)),
            affinity: Some(PodAffinity::with_key(DEFAULT_AFFINITY_TOPOLOGY_KEY)),
            pod_disruption_budget: Some(PodDisruptionBudgetSpec::max_unavailable(1)),
            ..Default::default()
        }
    }

    fn defaults(&self) -> PerconaXtraDBCluster {
        let mut cr = PerconaXtraDBCluster {
            api_version: self.api_version().to_string(),
            kind: Engine::Pxc.kind().to_string(),
            ..Default::default()
        };
        cr.metadata.finalizers = Some(vec![PXC_FINALIZER.to_string()]);

        let spec = &mut cr.spec;
        spec.pause = self.version.supports_pause().then_some(false);
        spec.pxc = Some(self.pod_group(Component::Primary, 3, "6G"));
        spec.proxysql = Some(self.pod_group(Component::Proxy, 1, "1G"));
        spec.pmm = Some(PmmSpec {
            enabled: Some(false),
            server_host: Some("monitoring-service".to_string()),
            image: Some(format!("{}:{}-pmm", IMAGE_REPOSITORY, self.version.as_str())),
            server_user: Some("pmm".to_string()),
            ..Default::default()
        });
        spec.backup = Some(PxcBackupSpec {
            image: self.default_image(Component::Backup),
            service_account_name: Some(Engine::Pxc.operator_name().to_string()),
            ..Default::default()
        });
        cr
    }

    /// Edits shared by create and update
    fn apply_config(
        &self,
        cr: &mut PerconaXtraDBCluster,
        config: &ClusterConfig,
        storage: Option<&BackupStorageSpec>,
    ) -> Result<()> {
        if let Some(labels) = &config.labels {
            cr.metadata
                .labels
                .get_or_insert_with(Default::default)
                .extend(labels.clone());
        }

        let pxc = cr.spec.pxc.get_or_insert_with(PxcPodSpec::default);
        group(pxc).apply(&config.primary)?;
        let proxysql = cr.spec.proxysql.get_or_insert_with(PxcPodSpec::default);
        group(proxysql).apply(&config.proxy)?;

        if let Some(pmm) = &config.pmm {
            let spec = cr.spec.pmm.get_or_insert_with(PmmSpec::default);
            spec.enabled = Some(pmm.enabled);
            if pmm.image.is_some() {
                spec.image = pmm.image.clone();
            }
            if pmm.server_host.is_some() {
                spec.server_host = pmm.server_host.clone();
            }
            if pmm.server_user.is_some() {
                spec.server_user = pmm.server_user.clone();
            }
        }

        if let Some(storage) = storage {
            cr.spec
                .backup
                .get_or_insert_with(PxcBackupSpec::default)
                .storages
                .get_or_insert_with(Default::default)
                .insert(DEFAULT_BACKUP_STORAGE_NAME.to_string(), s3_storage(storage));
        }

        if let Some(schedules) = &config.backup_schedules {
            let entries = cr
                .spec
                .backup
                .get_or_insert_with(PxcBackupSpec::default)
                .schedule
                .get_or_insert_with(Vec::new);
            for schedule in schedules {
                let entry = PxcBackupSchedule {
                    name: schedule.name.clone(),
                    schedule: schedule.schedule.clone(),
                    keep: schedule.keep,
                    storage_name: schedule.storage_name().to_string(),
                    ..Default::default()
                };
                match entries.iter_mut().find(|e| e.name == schedule.name) {
                    Some(existing) => {
                        let extra = std::mem::take(&mut existing.extra);
                        *existing = PxcBackupSchedule { extra, ..entry };
                    }
                    None => entries.push(entry),
                }
            }
        }

        if config.paused.is_some() {
            cr.spec.pause = config.paused;
        }

        Ok(())
    }

    fn encode(&self, cr: &PerconaXtraDBCluster) -> Result<Value> {
        let document = serde_json::to_value(cr)?;
        self.marshal_requests(&document)?;
        Ok(document)
    }
}

fn group(spec: &mut PxcPodSpec) -> PodGroup<'_> {
    PodGroup {
        size: &mut spec.size,
        resources: &mut spec.resources,
        volume_spec: &mut spec.volume_spec,
        affinity: &mut spec.affinity,
    }
}

fn describe_group(name: &str, spec: Option<&PxcPodSpec>) -> ComponentDescription {
    ComponentDescription::new(
        name,
        spec.and_then(|s| s.size),
        spec.and_then(|s| s.image.as_ref()),
        spec.and_then(|s| s.resources.as_ref()),
        spec.and_then(|s| s.pod_disruption_budget.as_ref()),
        spec.and_then(|s| s.affinity.as_ref()),
        spec.and_then(|s| s.volume_spec.as_ref()),
    )
}

impl ResourceSpecBuilder for PxcBuilder {
    fn engine(&self) -> Engine {
        Engine::Pxc
    }

    fn version(&self) -> &str {
        self.version.as_str()
    }

    fn api_version(&self) -> &str {
        self.version.api_version()
    }

    fn default_images(&self) -> ImageOverrides {
        self.images_for(self.version.as_str())
    }

    fn derive_images(&self, version: &str) -> ImageOverrides {
        let mut images = self.images_for(version);
        images.insert(
            Component::Operator,
            format!("{}:{}", IMAGE_REPOSITORY, version),
        );
        images
    }

    fn check_config(&self, config: &ClusterConfig) -> Result<()> {
        config.validate()?;
        if config.paused.is_some() && !self.version.supports_pause() {
            return Err(Error::config(format!(
                "stopping and starting clusters needs operator 1.4.0 or newer, cluster runs {}",
                self.version.as_str()
            )));
        }
        if config.replset_name.is_some() {
            return Err(Error::config("replica set names only apply to MongoDB clusters"));
        }
        Ok(())
    }

    fn set_defaults(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.defaults())?)
    }

    fn set_new(
        &self,
        name: &str,
        config: &ClusterConfig,
        storage: Option<&BackupStorageSpec>,
        platform: PlatformType,
    ) -> Result<Value> {
        self.check_config(config)?;

        let mut cr = self.defaults();
        cr.metadata.name = Some(name.to_string());
        cr.spec.secrets_name = Some(Engine::Pxc.users_secret(name));
        self.apply_config(&mut cr, config, storage)?;

        if platform.is_mini() {
            if let Some(pxc) = cr.spec.pxc.as_mut() {
                group(pxc).relax_for_mini_platform(&config.primary);
            }
            if let Some(proxysql) = cr.spec.proxysql.as_mut() {
                group(proxysql).relax_for_mini_platform(&config.proxy);
            }
        }

        self.encode(&cr)
    }

    fn update_with(
        &self,
        existing: &Value,
        config: &ClusterConfig,
        storage: Option<&BackupStorageSpec>,
    ) -> Result<Value> {
        self.check_config(config)?;
        let mut cr: PerconaXtraDBCluster = decode_document(existing)?;
        self.apply_config(&mut cr, config, storage)?;
        let document = encode_patched(existing, &cr)?;
        self.marshal_requests(&document)?;
        Ok(document)
    }

    fn upgrade(&self, existing: &Value, images: &ImageOverrides) -> Result<Value> {
        let mut cr: PerconaXtraDBCluster = decode_document(existing)?;
        for (component, image) in images {
            let slot = match component {
                Component::Primary => &mut cr.spec.pxc.get_or_insert_with(Default::default).image,
                Component::Proxy => {
                    &mut cr.spec.proxysql.get_or_insert_with(Default::default).image
                }
                Component::Backup => {
                    &mut cr.spec.backup.get_or_insert_with(Default::default).image
                }
                Component::Operator => continue,
            };
            *slot = Some(image.clone());
        }
        encode_patched(existing, &cr)
    }

    fn marshal_requests(&self, document: &Value) -> Result<()> {
        let mut cr: PerconaXtraDBCluster = decode_document(document)?;
        if let Some(pxc) = cr.spec.pxc.as_mut() {
            group(pxc).check_quantities("pxc")?;
        }
        if let Some(proxysql) = cr.spec.proxysql.as_mut() {
            group(proxysql).check_quantities("proxysql")?;
        }
        Ok(())
    }

    fn describe(&self, document: &Value) -> Result<ClusterDescription> {
        let cr: PerconaXtraDBCluster = decode_document(document)?;
        let spec = &cr.spec;
        let primary_key = spec
            .pxc
            .as_ref()
            .and_then(|p| p.affinity.as_ref())
            .and_then(|a| a.anti_affinity_topology_key.as_deref());
        let backup = spec.backup.as_ref();

        Ok(ClusterDescription {
            name: cr.metadata.name.clone().unwrap_or_default(),
            engine: Engine::Pxc,
            state: document_state(cr.status.as_ref()),
            multi_az: is_multi_az(primary_key),
            labels: cr.metadata.labels.clone().unwrap_or_default(),
            components: vec![
                describe_group("PXC", spec.pxc.as_ref()),
                describe_group("ProxySQL", spec.proxysql.as_ref()),
            ],
            backup_image: backup.and_then(|b| b.image.clone()),
            backup_storages: backup
                .and_then(|b| b.storages.as_ref())
                .map(|s| s.keys().cloned().collect())
                .unwrap_or_default(),
            backup_schedules: backup
                .and_then(|b| b.schedule.as_ref())
                .map(|s| s.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default(),
        })
    }

    fn backup_document(&self, cluster: &str, backup: &str, storage: &str) -> Value {
        let type_meta = Engine::Pxc.backup_type_meta();
        json!({
            "apiVersion": type_meta.api_version,
            "kind": type_meta.kind,
            "metadata": {"name": backup},
            "spec": {"pxcCluster": cluster, "storageName": storage},
        })
    }
}
