//! Registry of supported operator versions and their bundles

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::adapters::{document_name, document_type};
use crate::crd::Engine;
use crate::error::{Error, Result};

use super::{PsmdbBuilder, PsmdbVersion, PxcBuilder, PxcVersion, ResourceSpecBuilder};

const PXC_BUNDLE: &str = include_str!("../../manifests/pxc-operator.yaml");
const PSMDB_BUNDLE: &str = include_str!("../../manifests/psmdb-operator.yaml");

const IMAGE_PLACEHOLDER: &str = "{{image}}";

/// Operator manifests applied before a cluster document
#[derive(Clone, Debug, PartialEq)]
pub struct Bundle {
    operator_name: String,
    default_image: String,
    documents: Vec<Value>,
}

impl Bundle {
    /// Parse a multi-document YAML bundle
    ///
    /// Every document needs apiVersion, kind and a name, and the bundle must
    /// hold the operator's Deployment.
    pub fn parse(operator_name: &str, default_image: &str, yaml: &str) -> Result<Self> {
        let mut documents = Vec::new();
        for de in serde_yaml::Deserializer::from_str(yaml) {
            let document = Value::deserialize(de)?;
            if document.is_null() {
                continue;
            }
            document_type(&document).map_err(|e| Error::config(format!("bundle: {}", e)))?;
            document_name(&document).map_err(|e| Error::config(format!("bundle: {}", e)))?;
            documents.push(document);
        }

        let bundle = Bundle {
            operator_name: operator_name.to_string(),
            default_image: default_image.to_string(),
            documents,
        };
        if !bundle.documents.iter().any(|d| bundle.is_operator(d)) {
            return Err(Error::config(format!(
                "bundle has no Deployment named {}",
                operator_name
            )));
        }
        Ok(bundle)
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    pub fn default_image(&self) -> &str {
        &self.default_image
    }

    fn is_operator(&self, document: &Value) -> bool {
        document.get("kind").and_then(Value::as_str) == Some("Deployment")
            && document_name(document).ok() == Some(self.operator_name.as_str())
    }

    /// Documents with the operator image filled in
    pub fn render(&self, operator_image: Option<&str>) -> Vec<Value> {
        let image = operator_image
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(self.default_image.as_str());

        self.documents
            .iter()
            .map(|document| {
                let mut document = document.clone();
                if self.is_operator(&document) {
                    substitute(&mut document, image);
                }
                document
            })
            .collect()
    }
}

fn substitute(value: &mut Value, image: &str) {
    match value {
        Value::String(s) if s.contains(IMAGE_PLACEHOLDER) => {
            *s = s.replace(IMAGE_PLACEHOLDER, image);
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, image)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, image)),
        _ => {}
    }
}

/// Builder and bundle for one engine version
#[derive(Clone, Debug)]
pub struct RegistryEntry {
    pub builder: Arc<dyn ResourceSpecBuilder>,
    pub bundle: Bundle,
}

/// Immutable lookup of supported versions
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it
/// after construction.
#[derive(Clone, Debug, Default)]
pub struct VersionRegistry {
    entries: BTreeMap<(Engine, String), RegistryEntry>,
    defaults: BTreeMap<Engine, String>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a version; `default` makes it what "" and "default" resolve to
    pub fn with_entry(
        mut self,
        builder: Arc<dyn ResourceSpecBuilder>,
        bundle: Bundle,
        default: bool,
    ) -> Self {
        let engine = builder.engine();
        let version = builder.version().to_string();
        if default {
            self.defaults.insert(engine, version.clone());
        }
        self.entries
            .insert((engine, version), RegistryEntry { builder, bundle });
        self
    }

    /// Every version this crate ships
    pub fn builtin() -> Result<Self> {
        let pxc = Engine::Pxc.operator_name();
        let psmdb = Engine::Psmdb.operator_name();

        let registry = Self::new()
            .with_entry(
                Arc::new(PxcBuilder::new(PxcVersion::V1_1_0)),
                Bundle::parse(pxc, "percona/percona-xtradb-cluster-operator:1.1.0", PXC_BUNDLE)?,
                false,
            )
            .with_entry(
                Arc::new(PxcBuilder::new(PxcVersion::V1_4_0)),
                Bundle::parse(pxc, "percona/percona-xtradb-cluster-operator:1.4.0", PXC_BUNDLE)?,
                true,
            )
            .with_entry(
                Arc::new(PsmdbBuilder::new(PsmdbVersion::V1_1_0)),
                Bundle::parse(
                    psmdb,
                    "percona/percona-server-mongodb-operator:1.1.0",
                    PSMDB_BUNDLE,
                )?,
                true,
            );

        debug!(entries = registry.entries.len(), "Built version registry");
        Ok(registry)
    }

    /// Builder and bundle for an engine version
    pub fn resolve(&self, engine: Engine, version: &str) -> Result<&RegistryEntry> {
        let requested = version.trim();
        let key = match requested {
            "" | "default" => self.defaults.get(&engine).map(String::as_str),
            other => Some(other),
        };

        key.and_then(|v| self.entries.get(&(engine, v.to_string())))
            .ok_or_else(|| Error::UnknownVersion {
                engine: engine.to_string(),
                version: requested.to_string(),
            })
    }

    /// Registered versions of an engine, oldest first
    pub fn versions(&self, engine: Engine) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|(e, _)| *e == engine)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_defaults_and_explicit_versions() {
        let registry = VersionRegistry::builtin().unwrap();

        let entry = registry.resolve(Engine::Pxc, "default").unwrap();
        assert_eq!(entry.builder.version(), "1.4.0");
        assert_eq!(registry.resolve(Engine::Pxc, "").unwrap().builder.version(), "1.4.0");
        assert_eq!(
            registry.resolve(Engine::Pxc, "1.1.0").unwrap().builder.api_version(),
            "pxc.percona.com/v1-1-0"
        );
        assert_eq!(
            registry.resolve(Engine::Psmdb, "default").unwrap().builder.engine(),
            Engine::Psmdb
        );
        assert_eq!(registry.versions(Engine::Pxc), vec!["1.1.0", "1.4.0"]);
    }

    #[test]
    fn unknown_version_fails() {
        let registry = VersionRegistry::builtin().unwrap();
        let err = registry.resolve(Engine::Psmdb, "9.9.9").unwrap_err();
        assert!(matches!(err, Error::UnknownVersion { .. }));
        assert!(err.to_string().contains("9.9.9"));
    }

    #[test]
    fn render_fills_operator_image_only() {
        let registry = VersionRegistry::builtin().unwrap();
        let bundle = &registry.resolve(Engine::Pxc, "1.4.0").unwrap().bundle;

        let rendered = bundle.render(None);
        assert_eq!(rendered.len(), 4);
        let deployment = rendered
            .iter()
            .find(|d| d["kind"] == "Deployment")
            .unwrap();
        assert_eq!(
            deployment["spec"]["template"]["spec"]["containers"][0]["image"],
            "percona/percona-xtradb-cluster-operator:1.4.0"
        );

        let custom = bundle.render(Some("registry.local/pxc-operator:dev"));
        let deployment = custom.iter().find(|d| d["kind"] == "Deployment").unwrap();
        assert_eq!(
            deployment["spec"]["template"]["spec"]["containers"][0]["image"],
            "registry.local/pxc-operator:dev"
        );
    }

    #[test]
    fn malformed_bundle_is_rejected() {
        let no_operator = "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: op\n";
        assert!(Bundle::parse("op", "img", no_operator).is_err());

        let anonymous = "apiVersion: v1\nkind: ServiceAccount\n";
        assert!(Bundle::parse("op", "img", anonymous).is_err());

        assert!(Bundle::parse("op", "img", "kind: [").is_err());
    }
}
