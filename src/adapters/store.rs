//! Object store seam between the engine and the orchestration platform

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::core::TypeMeta;
use serde_json::Value;

use crate::error::{Error, Result};

/// Generic transport to the platform holding cluster documents
///
/// Documents travel as JSON so that fields a builder does not model reach
/// the platform unchanged.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Full JSON of an object, `Error::NotFound` when absent
    async fn get(&self, type_meta: &TypeMeta, name: &str) -> Result<Vec<u8>>;

    /// Create or update an object from its complete document
    async fn submit(&self, document: &Value) -> Result<()>;

    /// Delete an object; deleting an absent object succeeds
    async fn delete(&self, type_meta: &TypeMeta, name: &str) -> Result<()>;

    /// Delete the persistent volumes that belong to a cluster
    async fn delete_volumes(&self, cluster: &str) -> Result<()>;

    /// Names of every object of a type
    async fn list(&self, type_meta: &TypeMeta) -> Result<Vec<String>>;

    /// Recent log output of an operator deployment
    async fn operator_logs(&self, operator: &str) -> Result<Vec<u8>>;

    /// Decoded data of a secret
    async fn secret_values(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>>;

    async fn exists(&self, type_meta: &TypeMeta, name: &str) -> Result<bool> {
        match self.get(type_meta, name).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Object name from a document's metadata
pub fn document_name(document: &Value) -> Result<&str> {
    document
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::store("document has no metadata.name"))
}

/// Type reference of a document
pub fn document_type(document: &Value) -> Result<TypeMeta> {
    let field = |key: &str| {
        document
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::store(format!("document has no {}", key)))
    };
    Ok(TypeMeta {
        api_version: field("apiVersion")?,
        kind: field("kind")?,
    })
}
