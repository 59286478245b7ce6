//! Versioned resource document builders
//!
//! Every supported operator version gets one [`ResourceSpecBuilder`]; the
//! [`VersionRegistry`] picks the right one so call sites never branch on
//! versions themselves.

mod common;
mod describe;
mod psmdb;
mod pxc;
mod registry;

pub use describe::*;
pub use psmdb::*;
pub use pxc::*;
pub use registry::*;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::adapters::{BackupStorageSpec, ClusterConfig, PlatformType};
use crate::crd::Engine;
use crate::error::{Error, Result};

/// Image-carrying parts of a cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    /// Database nodes
    Primary,
    /// Proxy tier in front of the database nodes
    Proxy,
    /// Backup agent
    Backup,
    /// Operator deployment, applied by re-rendering the bundle
    Operator,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Primary => "primary",
            Component::Proxy => "proxy",
            Component::Backup => "backup",
            Component::Operator => "operator",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "pxc" | "psmdb" | "mongod" | "database" => Ok(Component::Primary),
            "proxy" | "proxysql" => Ok(Component::Proxy),
            "backup" => Ok(Component::Backup),
            "operator" => Ok(Component::Operator),
            other => Err(Error::config(format!(
                "Unknown component '{}': must be one of: primary, proxy, backup, operator",
                other
            ))),
        }
    }
}

/// Per-component image references; absent keys mean "leave unchanged"
pub type ImageOverrides = BTreeMap<Component, String>;

/// Capability set every operator version implements
///
/// Documents cross this boundary as JSON values: builders decode them into
/// their own typed shape, and anything that shape does not model is carried
/// through untouched.
pub trait ResourceSpecBuilder: Send + Sync + fmt::Debug {
    fn engine(&self) -> Engine;

    /// Operator version this builder targets
    fn version(&self) -> &str;

    /// apiVersion of cluster documents
    fn api_version(&self) -> &str;

    /// Images shipped with this version, excluding the operator
    fn default_images(&self) -> ImageOverrides;

    /// Images of another release of the same operator, including the operator
    fn derive_images(&self, version: &str) -> ImageOverrides;

    /// Reject config this version cannot express
    fn check_config(&self, config: &ClusterConfig) -> Result<()>;

    /// Fresh document populated with the version baseline
    fn set_defaults(&self) -> Result<Value>;

    /// Full desired document for a first-time create
    fn set_new(
        &self,
        name: &str,
        config: &ClusterConfig,
        storage: Option<&BackupStorageSpec>,
        platform: PlatformType,
    ) -> Result<Value>;

    /// Patch a stored document with the fields the user set
    fn update_with(
        &self,
        existing: &Value,
        config: &ClusterConfig,
        storage: Option<&BackupStorageSpec>,
    ) -> Result<Value>;

    /// Replace the images named in `images`
    fn upgrade(&self, existing: &Value, images: &ImageOverrides) -> Result<Value>;

    /// Check that quantity fields of a document are well formed
    fn marshal_requests(&self, document: &Value) -> Result<()>;

    fn describe(&self, document: &Value) -> Result<ClusterDescription>;

    /// On-demand backup of `cluster` into `storage`
    fn backup_document(&self, cluster: &str, backup: &str, storage: &str) -> Value;
}

/// Images to apply on upgrade
///
/// Precedence: explicit override, then images derived from `target_version`,
/// then the builder's built-in table. The built-in table only fills gaps in a
/// version upgrade; without a target version only explicit images are applied.
pub fn resolve_images(
    builder: &dyn ResourceSpecBuilder,
    target_version: Option<&str>,
    explicit: &BTreeMap<String, String>,
) -> Result<ImageOverrides> {
    let mut images = ImageOverrides::new();

    if let Some(version) = target_version.map(str::trim).filter(|v| !v.is_empty()) {
        images.extend(builder.default_images());
        images.extend(builder.derive_images(version));
    }

    for (key, image) in explicit {
        let image = image.trim();
        if image.is_empty() {
            continue;
        }
        images.insert(key.parse()?, image.to_string());
    }

    Ok(images)
}

fn decode_document<T: serde::de::DeserializeOwned>(document: &Value) -> Result<T> {
    serde_json::from_value(document.clone()).map_err(Error::from)
}

/// Encode a patched document, putting back keys its typed shape dropped
///
/// Nested Kubernetes types (object metadata, volume claims) have no catch-all
/// field, so whatever the decode of `original` lost is restored from it.
fn encode_patched<T>(original: &Value, patched: &T) -> Result<Value>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let carried = serde_json::to_value(decode_document::<T>(original)?)?;
    let mut document = serde_json::to_value(patched)?;
    restore_dropped(original, &carried, &mut document);
    Ok(document)
}

fn restore_dropped(original: &Value, carried: &Value, document: &mut Value) {
    let (Value::Object(original), Value::Object(carried), Value::Object(document)) =
        (original, carried, document)
    else {
        return;
    };
    for (key, value) in original {
        match carried.get(key) {
            None => {
                document.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Some(carried) => {
                if let Some(target) = document.get_mut(key) {
                    restore_dropped(value, carried, target);
                }
            }
        }
    }
}
