//! Object store backed by a Kubernetes API server

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{
    api::{
        ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, LogParams, Patch,
        PatchParams,
    },
    core::TypeMeta,
    Api, Client, ResourceExt,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::secrets::{get_secret, secret_data};
use super::store::{document_name, document_type, ObjectStore};

/// Field manager recorded on every server-side apply
pub const FIELD_MANAGER: &str = "dbaas-engine";

/// Log lines read from the operator on each poll
const OPERATOR_LOG_TAIL: i64 = 200;

/// Object store over dynamic objects in one namespace
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    namespace: String,
}

impl KubeObjectStore {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn dynamic_api(&self, type_meta: &TypeMeta) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(&gvk(type_meta));
        Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
    }
}

fn gvk(type_meta: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match type_meta.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", type_meta.api_version.as_str()),
    };
    GroupVersionKind::gvk(group, version, &type_meta.kind)
}

fn map_not_found(kind: &str, name: &str) -> impl FnOnce(kube::Error) -> Error {
    let kind = kind.to_string();
    let name = name.to_string();
    move |e| match e {
        kube::Error::Api(api_err) if api_err.code == 404 => Error::not_found(kind, name),
        other => Error::Kube(other),
    }
}

/// Strip fields server-side apply refuses or owns
fn apply_payload(document: &Value) -> Value {
    let mut payload = document.clone();
    if let Some(object) = payload.as_object_mut() {
        object.remove("status");
    }
    if let Some(metadata) = payload.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("managedFields");
        metadata.remove("resourceVersion");
    }
    payload
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, type_meta: &TypeMeta, name: &str) -> Result<Vec<u8>> {
        let object = self
            .dynamic_api(type_meta)
            .get(name)
            .await
            .map_err(map_not_found(&type_meta.kind, name))?;
        Ok(serde_json::to_vec(&object)?)
    }

    async fn submit(&self, document: &Value) -> Result<()> {
        let type_meta = document_type(document)?;
        let name = document_name(document)?;
        let params = PatchParams::apply(FIELD_MANAGER).force();

        self.dynamic_api(&type_meta)
            .patch(name, &params, &Patch::Apply(apply_payload(document)))
            .await?;

        debug!(kind = %type_meta.kind, name = %name, "Applied document");
        Ok(())
    }

    async fn delete(&self, type_meta: &TypeMeta, name: &str) -> Result<()> {
        match self
            .dynamic_api(type_meta)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(kind = %type_meta.kind, name = %name, "Deleted object");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn delete_volumes(&self, cluster: &str) -> Result<()> {
        let claims: Api<PersistentVolumeClaim> =
            Api::namespaced(self.client.clone(), &self.namespace);
        let selector = format!("app.kubernetes.io/instance={}", cluster);
        claims
            .delete_collection(&DeleteParams::default(), &ListParams::default().labels(&selector))
            .await?;
        info!(cluster = %cluster, "Deleted persistent volume claims");
        Ok(())
    }

    async fn list(&self, type_meta: &TypeMeta) -> Result<Vec<String>> {
        let objects = self
            .dynamic_api(type_meta)
            .list(&ListParams::default())
            .await?;
        Ok(objects.items.iter().map(|o| o.name_any()).collect())
    }

    async fn operator_logs(&self, operator: &str) -> Result<Vec<u8>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let selector = format!("name={}", operator);
        let list = pods.list(&ListParams::default().labels(&selector)).await?;
        let pod = list
            .items
            .first()
            .ok_or_else(|| Error::not_found("Pod", operator))?;

        let params = LogParams {
            tail_lines: Some(OPERATOR_LOG_TAIL),
            ..Default::default()
        };
        let logs = pods.logs(&pod.name_any(), &params).await?;
        Ok(logs.into_bytes())
    }

    async fn secret_values(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let secret = get_secret(&self.client, name, &self.namespace).await?;
        Ok(secret_data(&secret))
    }
}
