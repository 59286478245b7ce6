//! Normalizes the platform's raw status into a lifecycle state

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adapters::secret_string;
use crate::crd::{Engine, DEFAULT_REPLSET_NAME};
use crate::error::{Error, Result};

use super::messages::rewrite;

/// Normalized lifecycle state of a cluster or backup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    #[default]
    Unknown,
    Init,
    Ready,
    Error,
}

impl ClusterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClusterState::Ready | ClusterState::Error)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterState::Unknown => "unknown",
            ClusterState::Init => "initializing",
            ClusterState::Ready => "ready",
            ClusterState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Login for one system user
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub role: String,
    pub user: String,
    pub password: String,
}

/// Where applications connect to a ready cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub credentials: Vec<Credential>,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Host: {}, Port: {}", self.host, self.port)?;
        for c in &self.credentials {
            if c.role.is_empty() {
                write!(f, ", User: {}, Pass: {}", c.user, c.password)?;
            } else {
                write!(f, ", {} User: {}, {} Password: {}", c.role, c.user, c.role, c.password)?;
            }
        }
        Ok(())
    }
}

/// Outcome of one status classification
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusReport {
    pub state: ClusterState,
    pub messages: Vec<String>,
    pub endpoint: Option<Endpoint>,
}

impl StatusReport {
    fn init() -> Self {
        StatusReport {
            state: ClusterState::Init,
            ..Default::default()
        }
    }
}

/// Fields of the raw object the normalizer reads
#[derive(Debug, Default, Deserialize)]
struct RawObject {
    #[serde(default)]
    spec: Option<RawSpec>,
    #[serde(default)]
    status: Option<RawStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSpec {
    #[serde(default)]
    replsets: Vec<RawReplset>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReplset {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    messages: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    replsets: Option<BTreeMap<String, RawStatus>>,
}

impl RawStatus {
    fn state(&self) -> &str {
        self.status
            .as_deref()
            .or(self.state.as_deref())
            .unwrap_or_default()
    }

    fn all_messages(&self) -> Vec<String> {
        self.messages
            .iter()
            .flatten()
            .chain(self.message.iter())
            .chain(self.error.iter())
            .filter(|m| !m.is_empty())
            .cloned()
            .collect()
    }
}

fn decode(raw: &[u8]) -> Result<RawObject> {
    serde_json::from_slice(raw).map_err(Error::StatusDecode)
}

/// Classifies status payloads of one cluster
#[derive(Clone, Debug)]
pub struct StatusNormalizer {
    engine: Engine,
    cluster: String,
    replset: Option<String>,
}

impl StatusNormalizer {
    pub fn new(engine: Engine, cluster: impl Into<String>) -> Self {
        Self {
            engine,
            cluster: cluster.into(),
            replset: None,
        }
    }

    /// Replica set whose status decides readiness (MongoDB only)
    pub fn with_replset(mut self, replset: impl Into<String>) -> Self {
        self.replset = Some(replset.into());
        self
    }

    /// Classify the full object JSON of a cluster
    pub fn classify(
        &self,
        raw: &[u8],
        secrets: &BTreeMap<String, Vec<u8>>,
    ) -> Result<StatusReport> {
        let object = decode(raw)?;
        let Some(status) = object.status.as_ref() else {
            return Ok(StatusReport::init());
        };

        let (effective, replset) = match self.engine {
            Engine::Pxc => (status, None),
            Engine::Psmdb => {
                let replset = self
                    .replset
                    .clone()
                    .or_else(|| {
                        object
                            .spec
                            .as_ref()
                            .and_then(|s| s.replsets.first())
                            .map(|rs| rs.name.clone())
                            .filter(|n| !n.is_empty())
                    })
                    .unwrap_or_else(|| DEFAULT_REPLSET_NAME.to_string());
                let effective = status
                    .replsets
                    .as_ref()
                    .and_then(|rs| rs.get(&replset))
                    .unwrap_or(status);
                (effective, Some(replset))
            }
        };

        match effective.state() {
            "ready" => {
                let endpoint = self.endpoint(status, replset.as_deref(), secrets);
                let message = format!(
                    "{} cluster started successfully, right endpoint for application: {}",
                    self.engine.product(),
                    endpoint
                );
                Ok(StatusReport {
                    state: ClusterState::Ready,
                    messages: vec![message],
                    endpoint: Some(endpoint),
                })
            }
            "error" => Ok(StatusReport {
                state: ClusterState::Error,
                messages: effective
                    .all_messages()
                    .iter()
                    .map(|m| rewrite(self.engine, m))
                    .collect(),
                endpoint: None,
            }),
            _ => Ok(StatusReport::init()),
        }
    }

    /// Classify the full object JSON of an on-demand backup
    pub fn classify_backup(&self, backup: &str, raw: &[u8]) -> Result<StatusReport> {
        let object = decode(raw)?;
        let Some(status) = object.status.as_ref() else {
            return Ok(StatusReport::init());
        };

        match status.state().to_ascii_lowercase().as_str() {
            "succeeded" | "ready" => {
                let mut message = format!("Backup {} of cluster {} finished", backup, self.cluster);
                if let Some(destination) = status.destination.as_deref().filter(|d| !d.is_empty()) {
                    message.push_str(&format!(", destination: {}", destination));
                }
                Ok(StatusReport {
                    state: ClusterState::Ready,
                    messages: vec![message],
                    endpoint: None,
                })
            }
            "failed" | "error" | "rejected" => {
                let mut messages = status.all_messages();
                if messages.is_empty() {
                    messages.push(format!("Backup {} of cluster {} failed", backup, self.cluster));
                }
                Ok(StatusReport {
                    state: ClusterState::Error,
                    messages,
                    endpoint: None,
                })
            }
            _ => Ok(StatusReport::init()),
        }
    }

    fn endpoint(
        &self,
        status: &RawStatus,
        replset: Option<&str>,
        secrets: &BTreeMap<String, Vec<u8>>,
    ) -> Endpoint {
        let component = replset.unwrap_or("proxysql");
        let host = status
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("{0}-{1}-0.{0}-{1}", self.cluster, component));
        let value = |key: &str| secret_string(secrets, key).unwrap_or_default();

        let credentials = match self.engine {
            Engine::Pxc => vec![Credential {
                role: String::new(),
                user: "root".to_string(),
                password: value("root"),
            }],
            Engine::Psmdb => vec![
                Credential {
                    role: "ClusterAdmin".to_string(),
                    user: value("MONGODB_CLUSTER_ADMIN_USER"),
                    password: value("MONGODB_CLUSTER_ADMIN_PASSWORD"),
                },
                Credential {
                    role: "UserAdmin".to_string(),
                    user: value("MONGODB_USER_ADMIN_USER"),
                    password: value("MONGODB_USER_ADMIN_PASSWORD"),
                },
            ],
        };

        Endpoint {
            host,
            port: self.engine.port(),
            credentials,
        }
    }
}
