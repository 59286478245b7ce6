//! Human summary of a stored cluster document

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::crd::{Engine, PodAffinity, PodDisruptionBudgetSpec, PodResources, VolumeSpec};
use crate::crd::{AFFINITY_TOPOLOGY_KEY_OFF, DEFAULT_AFFINITY_TOPOLOGY_KEY};

use super::common::int_or_string;

const NOT_SET: &str = "not set";

/// Summary of a cluster as the platform stores it
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescription {
    pub name: String,
    pub engine: Engine,
    pub state: String,
    pub multi_az: bool,
    pub labels: BTreeMap<String, String>,
    pub components: Vec<ComponentDescription>,
    pub backup_image: Option<String>,
    pub backup_storages: Vec<String>,
    pub backup_schedules: Vec<String>,
}

/// One pod group of a cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescription {
    pub name: String,
    pub count: Option<i32>,
    pub image: Option<String>,
    pub cpu_request: Option<String>,
    pub memory_request: Option<String>,
    pub min_available: String,
    pub max_unavailable: String,
    pub anti_affinity_key: Option<String>,
    pub storage_class: Option<String>,
    pub storage_size: Option<String>,
}

impl ComponentDescription {
    pub(crate) fn new(
        name: &str,
        count: Option<i32>,
        image: Option<&String>,
        resources: Option<&PodResources>,
        budget: Option<&PodDisruptionBudgetSpec>,
        affinity: Option<&PodAffinity>,
        volume: Option<&VolumeSpec>,
    ) -> Self {
        let requests = resources.and_then(|r| r.requests.as_ref());
        Self {
            name: name.to_string(),
            count,
            image: image.cloned(),
            cpu_request: requests.and_then(|r| r.cpu.clone()),
            memory_request: requests.and_then(|r| r.memory.clone()),
            min_available: int_or_string(&budget.and_then(|b| b.min_available.clone())),
            max_unavailable: int_or_string(&budget.and_then(|b| b.max_unavailable.clone())),
            anti_affinity_key: affinity.and_then(|a| a.anti_affinity_topology_key.clone()),
            storage_class: volume.and_then(VolumeSpec::storage_class).map(str::to_string),
            storage_size: volume
                .and_then(VolumeSpec::storage_request)
                .map(|q| q.0.clone()),
        }
    }
}

/// Lifecycle state recorded in a document's status
pub(crate) fn document_state(status: Option<&Value>) -> String {
    status
        .and_then(|s| s.get("status").or_else(|| s.get("state")))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Spread over zones unless the primary group pins to hosts or nothing
pub(crate) fn is_multi_az(primary_key: Option<&str>) -> bool {
    match primary_key {
        None => false,
        Some(key) => key != AFFINITY_TOPOLOGY_KEY_OFF && key != DEFAULT_AFFINITY_TOPOLOGY_KEY,
    }
}

fn or_not_set(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NOT_SET)
}

fn joined(values: &[String]) -> String {
    if values.is_empty() {
        NOT_SET.to_string()
    } else {
        values.join(", ")
    }
}

impl fmt::Display for ClusterDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>();

        writeln!(f, "{:<36}{}", "Name:", self.name)?;
        writeln!(f, "{:<36}{}", "Engine:", self.engine.product())?;
        writeln!(f, "{:<36}{}", "Status:", self.state)?;
        writeln!(
            f,
            "{:<36}{}",
            "Multi-Az:",
            if self.multi_az { "yes" } else { "no" }
        )?;
        writeln!(f, "{:<36}{}", "Labels:", joined(&labels))?;

        for c in &self.components {
            writeln!(f)?;
            let count = c.count.map(|n| n.to_string());
            let budget = format!(
                "minAvailable={} maxUnavailable={}",
                c.min_available, c.max_unavailable
            );
            let rows: [(&str, &str); 8] = [
                ("Count:", or_not_set(&count)),
                ("Image:", or_not_set(&c.image)),
                ("CPU Requests:", or_not_set(&c.cpu_request)),
                ("Memory Requests:", or_not_set(&c.memory_request)),
                ("PodDisruptionBudget:", budget.as_str()),
                ("AntiAffinityTopologyKey:", or_not_set(&c.anti_affinity_key)),
                ("StorageType:", or_not_set(&c.storage_class)),
                ("Allocated Storage:", or_not_set(&c.storage_size)),
            ];
            for (label, value) in rows {
                writeln!(f, "{:<36}{}", format!("{} {}", c.name, label), value)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "{:<36}{}", "Backup Image:", or_not_set(&self.backup_image))?;
        writeln!(f, "{:<36}{}", "Backup Storages:", joined(&self.backup_storages))?;
        write!(f, "{:<36}{}", "Backup Schedule:", joined(&self.backup_schedules))
    }
}
