//! Lifecycle operations: create, edit, upgrade, delete, backup
//!
//! Every operation resolves its builder and validates input synchronously,
//! then hands the store work and the poll loop to a background task that
//! reports through an [`OperationHandle`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use kube::core::TypeMeta;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::adapters::{ObjectStore, Operation, OperationRequest, DEFAULT_BACKUP_STORAGE_NAME};
use crate::builders::{
    resolve_images, Component, RegistryEntry, ResourceSpecBuilder, VersionRegistry,
};
use crate::crd::Engine;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::ClusterHandle;
use crate::settings::EngineSettings;

use super::handle::{channel, OperationHandle, OperationOutcome};
use super::inflight::{InFlight, InFlightGuard};
use super::poller::{Poller, Probe};
use super::Context;

/// Entry point for lifecycle operations
#[derive(Clone)]
pub struct Lifecycle {
    ctx: Arc<Context>,
}

impl Lifecycle {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<VersionRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(Context::new(store, registry, settings)),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.ctx.settings
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.ctx.in_flight
    }

    /// Dispatch a request to its operation
    pub fn launch(&self, request: &OperationRequest) -> Result<OperationHandle> {
        match request.operation {
            Operation::Create => self.create(request),
            Operation::Edit => self.edit(request),
            Operation::Upgrade => self.upgrade(request),
            Operation::Delete => self.delete(request),
            Operation::Backup => self.backup(request),
        }
    }

    #[instrument(skip(self, request), fields(engine = %request.engine, cluster = %request.name, operation = "create"))]
    pub fn create(&self, request: &OperationRequest) -> Result<OperationHandle> {
        let entry = self.resolve(request)?;
        let builder = entry.builder.clone();

        // Validate input before anything is submitted
        let config = request.options.translate()?;
        let storage = request.options.backup_storage()?;
        builder.check_config(&config)?;
        let document = builder.set_new(&request.name, &config, storage.as_ref(), request.platform)?;
        builder.marshal_requests(&document)?;
        let bundle = entry.bundle.render(request.operator_image.as_deref());

        let guard = self.ctx.in_flight.acquire(request.engine, &request.name)?;
        let cluster = self.cluster_handle(request, config.replset_name.as_deref());
        let type_meta = request.engine.type_meta(builder.api_version());
        let store = self.ctx.store.clone();
        let name = request.name.clone();
        let engine = request.engine;

        let submit = {
            let type_meta = type_meta.clone();
            async move {
                if store.exists(&type_meta, &name).await? {
                    return Err(Error::AlreadyExists {
                        kind: engine.kind().to_string(),
                        existing: store.list(&type_meta).await?,
                        name,
                    });
                }
                for manifest in &bundle {
                    store.submit(manifest).await?;
                }
                store.submit(&document).await?;
                info!(cluster = %name, "Submitted cluster document");
                Ok::<_, Error>(Probe::Cluster)
            }
        };

        Ok(self.spawn(Operation::Create, cluster, type_meta, guard, submit))
    }

    #[instrument(skip(self, request), fields(engine = %request.engine, cluster = %request.name, operation = "edit"))]
    pub fn edit(&self, request: &OperationRequest) -> Result<OperationHandle> {
        let entry = self.resolve(request)?;
        let builder = entry.builder.clone();

        let config = request.options.translate()?;
        let storage = request.options.backup_storage()?;
        builder.check_config(&config)?;

        let guard = self.ctx.in_flight.acquire(request.engine, &request.name)?;
        let cluster = self.cluster_handle(request, config.replset_name.as_deref());
        let type_meta = request.engine.type_meta(builder.api_version());
        let store = self.ctx.store.clone();
        let name = request.name.clone();

        let submit = {
            let type_meta = type_meta.clone();
            async move {
                let existing = read_document(store.as_ref(), &type_meta, &name).await?;
                let updated = builder.update_with(&existing, &config, storage.as_ref())?;
                builder.marshal_requests(&updated)?;
                store.submit(&updated).await?;
                info!(cluster = %name, "Submitted updated cluster document");
                Ok::<_, Error>(Probe::Cluster)
            }
        };

        Ok(self.spawn(Operation::Edit, cluster, type_meta, guard, submit))
    }

    #[instrument(skip(self, request), fields(engine = %request.engine, cluster = %request.name, operation = "upgrade"))]
    pub fn upgrade(&self, request: &OperationRequest) -> Result<OperationHandle> {
        let entry = self.resolve(request)?;
        let builder = entry.builder.clone();

        let images = resolve_images(
            builder.as_ref(),
            request.target_version.as_deref(),
            &request.images,
        )?;
        let operator_image = images
            .get(&Component::Operator)
            .cloned()
            .or_else(|| request.operator_image.clone());
        let bundle = operator_image
            .as_deref()
            .map(|image| entry.bundle.render(Some(image)))
            .unwrap_or_default();

        let guard = self.ctx.in_flight.acquire(request.engine, &request.name)?;
        let cluster = self.cluster_handle(request, request.options.replset_name.as_deref());
        let type_meta = request.engine.type_meta(builder.api_version());
        let store = self.ctx.store.clone();
        let name = request.name.clone();

        let submit = {
            let type_meta = type_meta.clone();
            async move {
                let existing = read_document(store.as_ref(), &type_meta, &name).await?;
                let upgraded = builder.upgrade(&existing, &images)?;
                builder.marshal_requests(&upgraded)?;
                for manifest in &bundle {
                    store.submit(manifest).await?;
                }
                store.submit(&upgraded).await?;
                info!(cluster = %name, images = images.len(), "Submitted upgraded cluster document");
                Ok::<_, Error>(Probe::Cluster)
            }
        };

        Ok(self.spawn(Operation::Upgrade, cluster, type_meta, guard, submit))
    }

    #[instrument(skip(self, request), fields(engine = %request.engine, cluster = %request.name, operation = "delete"))]
    pub fn delete(&self, request: &OperationRequest) -> Result<OperationHandle> {
        let entry = self.resolve(request)?;

        let guard = self.ctx.in_flight.acquire(request.engine, &request.name)?;
        let cluster = self.cluster_handle(request, None);
        let type_meta = request.engine.type_meta(entry.builder.api_version());
        let store = self.ctx.store.clone();
        let name = request.name.clone();
        let engine = request.engine;
        let clear_data = request.clear_data;

        let submit = {
            let type_meta = type_meta.clone();
            async move {
                if !store.exists(&type_meta, &name).await? {
                    return Err(Error::not_found(engine.kind(), name));
                }
                store.delete(&type_meta, &name).await?;
                if clear_data {
                    store.delete_volumes(&name).await?;
                    info!(cluster = %name, "Requested volume removal");
                }
                info!(cluster = %name, "Requested cluster removal");
                Ok::<_, Error>(Probe::Gone)
            }
        };

        Ok(self.spawn(Operation::Delete, cluster, type_meta, guard, submit))
    }

    #[instrument(skip(self, request), fields(engine = %request.engine, cluster = %request.name, operation = "backup"))]
    pub fn backup(&self, request: &OperationRequest) -> Result<OperationHandle> {
        let entry = self.resolve(request)?;
        let builder = entry.builder.clone();

        let storage = request
            .backup_storage
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_BACKUP_STORAGE_NAME)
            .to_string();
        let backup_name = request
            .backup_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| generate_backup_name(&request.name));

        let guard = self.ctx.in_flight.acquire(request.engine, &request.name)?;
        let cluster = self.cluster_handle(request, request.options.replset_name.as_deref());
        let type_meta = request.engine.type_meta(builder.api_version());
        let store = self.ctx.store.clone();
        let name = request.name.clone();

        let submit = {
            let type_meta = type_meta.clone();
            async move {
                let existing = read_document(store.as_ref(), &type_meta, &name).await?;
                let description = builder.describe(&existing)?;
                if !description.backup_storages.contains(&storage) {
                    return Err(Error::config(format!(
                        "Backup storage '{}' is not configured for cluster {}. Available storages: [{}]",
                        storage,
                        name,
                        description.backup_storages.join(", ")
                    )));
                }
                let document = builder.backup_document(&name, &backup_name, &storage);
                store.submit(&document).await?;
                info!(cluster = %name, backup = %backup_name, storage = %storage, "Submitted backup");
                Ok::<_, Error>(Probe::Backup(backup_name))
            }
        };

        Ok(self.spawn(Operation::Backup, cluster, type_meta, guard, submit))
    }

    fn resolve(&self, request: &OperationRequest) -> Result<&RegistryEntry> {
        self.ctx.registry.resolve(request.engine, &request.version)
    }

    fn cluster_handle(&self, request: &OperationRequest, replset: Option<&str>) -> ClusterHandle {
        let handle = ClusterHandle::new(
            request.engine,
            request.name.clone(),
            self.ctx.settings.watermark_policy,
        );
        match (request.engine, replset) {
            (Engine::Psmdb, Some(replset)) => handle.with_replset(replset),
            _ => handle,
        }
    }

    /// Run `submit` then poll, reporting through a fresh handle
    fn spawn<F>(
        &self,
        operation: Operation,
        cluster: ClusterHandle,
        type_meta: TypeMeta,
        guard: InFlightGuard,
        submit: F,
    ) -> OperationHandle
    where
        F: Future<Output = Result<Probe>> + Send + 'static,
    {
        let (handle, reporter) = channel(self.ctx.settings.progress_capacity);
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let started = Instant::now();
            let engine = cluster.engine();
            let name = cluster.name().to_string();
            let token = reporter.token().clone();

            let work = async {
                let probe = submit.await?;
                Poller {
                    store: ctx.store.as_ref(),
                    settings: &ctx.settings,
                    reporter: &reporter,
                    cluster,
                    type_meta,
                }
                .run(probe)
                .await
            };

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = work => result,
            };

            let outcome_label = match &result {
                Ok(_) => "success",
                Err(e) => e.label(),
            };
            metrics::OPERATIONS
                .with_label_values(&[operation.as_str(), engine.as_str(), outcome_label])
                .inc();
            metrics::OPERATION_DURATION
                .with_label_values(&[operation.as_str(), engine.as_str()])
                .observe(started.elapsed().as_secs_f64());

            match &result {
                Ok(_) => info!(cluster = %name, operation = %operation, "Operation finished"),
                Err(e) => warn!(cluster = %name, operation = %operation, error = %e, "Operation failed"),
            }

            reporter.finish(result.map(|report| OperationOutcome {
                operation,
                engine,
                cluster: name,
                state: report.state,
                messages: report.messages,
                endpoint: report.endpoint,
            }));
        });

        handle
    }
}

async fn read_document(store: &dyn ObjectStore, type_meta: &TypeMeta, name: &str) -> Result<Value> {
    let raw = store.get(type_meta, name).await?;
    Ok(serde_json::from_slice(&raw)?)
}

fn generate_backup_name(cluster: &str) -> String {
    format!("{}-{}", cluster, Utc::now().format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_backup_names_carry_cluster_and_timestamp() {
        let name = generate_backup_name("orders");
        assert!(name.starts_with("orders-"));
        assert_eq!(name.len(), "orders-".len() + 14);
        assert!(name["orders-".len()..].chars().all(|c| c.is_ascii_digit()));
    }
}
