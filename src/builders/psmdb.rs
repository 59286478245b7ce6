//! Builders for PerconaServerMongoDB documents

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::{json, Value};

use crate::adapters::{
    BackupStorageSpec, ClusterConfig, ComponentConfig, PlatformType, DEFAULT_BACKUP_STORAGE_NAME,
};
use crate::crd::{
    Engine, PerconaServerMongoDB, PmmSpec, PodAffinity, PodDisruptionBudgetSpec, PodResources,
    PsmdbBackupSpec, PsmdbBackupTask, PsmdbSecrets, ReplsetSpec, ResourceList, VolumeSpec,
    DEFAULT_AFFINITY_TOPOLOGY_KEY, DEFAULT_REPLSET_NAME,
};
use crate::error::{Error, Result};

use super::common::{s3_storage, PodGroup};
use super::describe::{document_state, is_multi_az};
use super::{
    decode_document, encode_patched, ClusterDescription, Component, ComponentDescription,
    ImageOverrides,
};
use super::ResourceSpecBuilder;

const IMAGE_REPOSITORY: &str = "percona/percona-server-mongodb-operator";

/// Supported PSMDB operator releases
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PsmdbVersion {
    V1_1_0,
}

impl PsmdbVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            PsmdbVersion::V1_1_0 => "1.1.0",
        }
    }

    fn api_version(self) -> &'static str {
        match self {
            PsmdbVersion::V1_1_0 => "psmdb.percona.com/v1-1-0",
        }
    }
}

/// Builder for one PSMDB operator release
#[derive(Clone, Debug)]
pub struct PsmdbBuilder {
    version: PsmdbVersion,
}

impl PsmdbBuilder {
    pub fn new(version: PsmdbVersion) -> Self {
        Self { version }
    }

    fn images_for(&self, tag: &str) -> ImageOverrides {
        ImageOverrides::from([
            (Component::Primary, format!("{}:{}-mongod4.0", IMAGE_REPOSITORY, tag)),
            (Component::Backup, format!("{}:{}-backup", IMAGE_REPOSITORY, tag)),
        ])
    }

    fn defaults(&self) -> PerconaServerMongoDB {
        let images = self.default_images();
        let mut cr = PerconaServerMongoDB {
            api_version: self.api_version().to_string(),
            kind: Engine::Psmdb.kind().to_string(),
            ..Default::default()
        };

        let spec = &mut cr.spec;
        spec.image = images.get(&Component::Primary).cloned();
        spec.replsets = vec![ReplsetSpec {
            name: DEFAULT_REPLSET_NAME.to_string(),
            size: Some(3),
            resources: Some(PodResources {
                requests: Some(ResourceList {
                    memory: Some("0.5G".to_string()),
                    cpu: Some("300m".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            volume_spec: Some(VolumeSpec::claim(Quantity("3G".to_string()), None)),
            affinity: Some(PodAffinity::with_key(DEFAULT_AFFINITY_TOPOLOGY_KEY)),
            pod_disruption_budget: Some(PodDisruptionBudgetSpec::max_unavailable(1)),
            ..Default::default()
        }];
        spec.pmm = Some(PmmSpec {
            enabled: Some(false),
            server_host: Some("monitoring-service".to_string()),
            image: Some(format!("{}:{}-pmm", IMAGE_REPOSITORY, self.version.as_str())),
            ..Default::default()
        });
        spec.backup = Some(PsmdbBackupSpec {
            enabled: Some(true),
            image: images.get(&Component::Backup).cloned(),
            service_account_name: Some(Engine::Psmdb.operator_name().to_string()),
            ..Default::default()
        });
        cr
    }

    fn apply_config(
        &self,
        cr: &mut PerconaServerMongoDB,
        config: &ClusterConfig,
        storage: Option<&BackupStorageSpec>,
    ) -> Result<()> {
        if let Some(labels) = &config.labels {
            cr.metadata
                .labels
                .get_or_insert_with(Default::default)
                .extend(labels.clone());
        }

        let replset = target_replset(cr, config.replset_name.as_deref())?;
        group(replset).apply(&config.primary)?;

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
                .get_or_insert_with(PsmdbBackupSpec::default)
                .storages
                .get_or_insert_with(Default::default)
                .insert(DEFAULT_BACKUP_STORAGE_NAME.to_string(), s3_storage(storage));
        }

        if let Some(schedules) = &config.backup_schedules {
            let tasks = cr
                .spec
                .backup
                .get_or_insert_with(PsmdbBackupSpec::default)
                .tasks
                .get_or_insert_with(Vec::new);
            for schedule in schedules {
                let task = PsmdbBackupTask {
                    name: schedule.name.clone(),
                    enabled: Some(true),
                    schedule: schedule.schedule.clone(),
                    storage_name: schedule.storage_name().to_string(),
                    keep: schedule.keep,
                    ..Default::default()
                };
                match tasks.iter_mut().find(|t| t.name == schedule.name) {
                    Some(existing) => {
                        let extra = std::mem::take(&mut existing.extra);
                        *existing = PsmdbBackupTask { extra, ..task };
                    }
                    None => tasks.push(task),
                }
            }
        }

        Ok(())
    }

    fn encode(&self, cr: &PerconaServerMongoDB) -> Result<Value> {
        let document = serde_json::to_value(cr)?;
        self.marshal_requests(&document)?;
        Ok(document)
    }
}

/// Replica set an edit applies to: the named one, else the first
fn target_replset<'a>(
    cr: &'a mut PerconaServerMongoDB,
    name: Option<&str>,
) -> Result<&'a mut ReplsetSpec> {
    match name {
        Some(name) => cr
            .spec
            .replset_mut(name)
            .ok_or_else(|| Error::config(format!("replica set '{}' not found", name))),
        None => {
            if cr.spec.replsets.is_empty() {
                cr.spec.replsets.push(ReplsetSpec {
                    name: DEFAULT_REPLSET_NAME.to_string(),
                    ..Default::default()
                });
            }
            let first = &mut cr.spec.replsets[0];
            Ok(first)
        }
    }
}

fn group(spec: &mut ReplsetSpec) -> PodGroup<'_> {
    PodGroup {
        size: &mut spec.size,
        resources: &mut spec.resources,
        volume_spec: &mut spec.volume_spec,
        affinity: &mut spec.affinity,
    }
}

impl ResourceSpecBuilder for PsmdbBuilder {
    fn engine(&self) -> Engine {
        Engine::Psmdb
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
        if config.paused.is_some() {
            return Err(Error::config(format!(
                "stopping and starting MongoDB clusters is not supported by operator {}",
                self.version.as_str()
            )));
        }
        if config.proxy != ComponentConfig::default() {
            return Err(Error::config("proxy options only apply to XtraDB clusters"));
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
        cr.spec.secrets = Some(PsmdbSecrets {
            users: Some(Engine::Psmdb.users_secret(name)),
            ..Default::default()
        });
        if let Some(rs_name) = &config.replset_name {
            cr.spec.replsets[0].name = rs_name.clone();
        }

        self.apply_config(&mut cr, config, storage)?;

        if platform.is_mini() {
            for replset in cr.spec.replsets.iter_mut() {
                group(replset).relax_for_mini_platform(&config.primary);
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
        let mut cr: PerconaServerMongoDB = decode_document(existing)?;
        self.apply_config(&mut cr, config, storage)?;
        let document = encode_patched(existing, &cr)?;
        self.marshal_requests(&document)?;
        Ok(document)
    }

    fn upgrade(&self, existing: &Value, images: &ImageOverrides) -> Result<Value> {
        let mut cr: PerconaServerMongoDB = decode_document(existing)?;
        for (component, image) in images {
            match component {
                Component::Primary => cr.spec.image = Some(image.clone()),
                Component::Backup => {
                    cr.spec
                        .backup
                        .get_or_insert_with(PsmdbBackupSpec::default)
                        .image = Some(image.clone())
                }
                Component::Proxy | Component::Operator => {}
            }
        }
        encode_patched(existing, &cr)
    }

    fn marshal_requests(&self, document: &Value) -> Result<()> {
        let mut cr: PerconaServerMongoDB = decode_document(document)?;
        for replset in cr.spec.replsets.iter_mut() {
            let label = format!("replset {}", replset.name);
            group(replset).check_quantities(&label)?;
        }
        Ok(())
    }

    fn describe(&self, document: &Value) -> Result<ClusterDescription> {
        let cr: PerconaServerMongoDB = decode_document(document)?;
        let spec = &cr.spec;
        let primary_key = spec
            .replsets
            .first()
            .and_then(|rs| rs.affinity.as_ref())
            .and_then(|a| a.anti_affinity_topology_key.as_deref());
        let backup = spec.backup.as_ref();

        let components = spec
            .replsets
            .iter()
            .map(|rs| {
                ComponentDescription::new(
                    &format!("Replica Set {}", rs.name),
                    rs.size,
                    spec.image.as_ref(),
                    rs.resources.as_ref(),
                    rs.pod_disruption_budget.as_ref(),
                    rs.affinity.as_ref(),
                    rs.volume_spec.as_ref(),
                )
            })
            .collect();

        Ok(ClusterDescription {
            name: cr.metadata.name.clone().unwrap_or_default(),
            engine: Engine::Psmdb,
            state: document_state(cr.status.as_ref()),
            multi_az: is_multi_az(primary_key),
            labels: cr.metadata.labels.clone().unwrap_or_default(),
            components,
            backup_image: backup.and_then(|b| b.image.clone()),
            backup_storages: backup
                .and_then(|b| b.storages.as_ref())
                .map(|s| s.keys().cloned().collect())
                .unwrap_or_default(),
            backup_schedules: backup
                .and_then(|b| b.tasks.as_ref())
                .map(|t| t.iter().map(|task| task.name.clone()).collect())
                .unwrap_or_default(),
        })
    }

    fn backup_document(&self, cluster: &str, backup: &str, storage: &str) -> Value {
        let type_meta = Engine::Psmdb.backup_type_meta();
        json!({
            "apiVersion": type_meta.api_version,
            "kind": type_meta.kind,
            "metadata": {"name": backup},
            "spec": {"psmdbCluster": cluster, "storageName": storage},
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ComponentConfig;

    fn builder() -> PsmdbBuilder {
        PsmdbBuilder::new(PsmdbVersion::V1_1_0)
    }

    #[test]
    fn set_new_names_secrets_and_replset() {
        let config = ClusterConfig {
            replset_name: Some("main".to_string()),
            primary: ComponentConfig {
                size: Some(5),
                request_mem: Some("2G".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = builder()
            .set_new("catalog", &config, None, PlatformType::Kubernetes)
            .unwrap();
        assert_eq!(doc["kind"], "PerconaServerMongoDB");
        assert_eq!(doc["spec"]["secrets"]["users"], "catalog-psmdb-secrets");
        assert_eq!(doc["spec"]["replsets"][0]["name"], "main");
        assert_eq!(doc["spec"]["replsets"][0]["size"], 5);
        assert_eq!(doc["spec"]["replsets"][0]["resources"]["requests"]["memory"], "2G");
        assert_eq!(doc["spec"]["replsets"][0]["resources"]["requests"]["cpu"], "300m");
        assert_eq!(
            doc["spec"]["image"],
            "percona/percona-server-mongodb-operator:1.1.0-mongod4.0"
        );
    }

    #[test]
    fn update_rejects_unknown_replset() {
        let doc = builder()
            .set_new("catalog", &ClusterConfig::default(), None, PlatformType::Kubernetes)
            .unwrap();
        let config = ClusterConfig {
            replset_name: Some("rs9".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            builder().update_with(&doc, &config, None),
            Err(Error::ConfigInvalid(_))
        ));
    }

    #[test]
    fn pause_is_not_supported() {
        let config = ClusterConfig {
            paused: Some(false),
            ..Default::default()
        };
        assert!(builder()
            .set_new("catalog", &config, None, PlatformType::Kubernetes)
            .is_err());
    }

    #[test]
    fn proxy_options_are_rejected() {
        let config = ClusterConfig {
            proxy: ComponentConfig {
                size: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = builder()
            .set_new("catalog", &config, None, PlatformType::Kubernetes)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));

        let doc = builder()
            .set_new("catalog", &ClusterConfig::default(), None, PlatformType::Kubernetes)
            .unwrap();
        assert!(builder().update_with(&doc, &config, None).is_err());
    }

    #[test]
    fn upgrade_ignores_proxy() {
        let doc = builder().set_defaults().unwrap();
        let images = ImageOverrides::from([
            (Component::Proxy, "proxy:1".to_string()),
            (Component::Backup, "backup:2".to_string()),
        ]);
        let upgraded = builder().upgrade(&doc, &images).unwrap();
        assert_eq!(upgraded["spec"]["backup"]["image"], "backup:2");
        assert_eq!(upgraded["spec"]["image"], doc["spec"]["image"]);
        assert!(upgraded["spec"].get("proxysql").is_none());
    }

    #[test]
    fn describe_lists_replsets() {
        let doc = builder()
            .set_new("catalog", &ClusterConfig::default(), None, PlatformType::Minikube)
            .unwrap();
        let description = builder().describe(&doc).unwrap();
        assert_eq!(description.components.len(), 1);
        assert_eq!(description.components[0].name, "Replica Set rs0");
        assert_eq!(description.components[0].anti_affinity_key.as_deref(), Some("none"));
        assert!(!description.multi_az);
        assert_eq!(description.state, "unknown");
    }

    #[test]
    fn upgrade_is_idempotent_per_component() {
        let mut doc = builder()
            .set_new("catalog", &ClusterConfig::default(), None, PlatformType::Kubernetes)
            .unwrap();
        doc["spec"]["backup"]["image"] = "custom/backup:1".into();

        let backup = ImageOverrides::from([(Component::Backup, "backup:v2".to_string())]);
        let once = builder().upgrade(&doc, &backup).unwrap();
        let twice = builder().upgrade(&once, &backup).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once["spec"]["backup"]["image"], "backup:v2");

        let primary = ImageOverrides::from([(Component::Primary, "primary:v3".to_string())]);
        let upgraded = builder().upgrade(&doc, &primary).unwrap();
        assert_eq!(upgraded["spec"]["image"], "primary:v3");
        assert_eq!(upgraded["spec"]["backup"]["image"], "custom/backup:1");
    }
}
