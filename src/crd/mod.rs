//! Operator document shapes for the supported database engines
//!
//! Each engine's custom resource is modelled with typed fields for what the
//! builders touch, plus a flattened catch-all so fields unknown to a given
//! version survive a read-modify-write cycle untouched.

mod common;
mod psmdb;
mod pxc;

pub use common::*;
pub use psmdb::*;
pub use pxc::*;

use std::fmt;
use std::str::FromStr;

use kube::core::TypeMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Database engine managed through its operator
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Percona XtraDB Cluster (MySQL)
    Pxc,
    /// Percona Server for MongoDB
    Psmdb,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Pxc => "pxc",
            Engine::Psmdb => "psmdb",
        }
    }

    /// Human product name used in messages
    pub fn product(self) -> &'static str {
        match self {
            Engine::Pxc => "MySQL",
            Engine::Psmdb => "MongoDB",
        }
    }

    /// Custom resource kind of the cluster document
    pub fn kind(self) -> &'static str {
        match self {
            Engine::Pxc => "PerconaXtraDBCluster",
            Engine::Psmdb => "PerconaServerMongoDB",
        }
    }

    /// Custom resource kind of on-demand backups
    pub fn backup_kind(self) -> &'static str {
        match self {
            Engine::Pxc => "PerconaXtraDBClusterBackup",
            Engine::Psmdb => "PerconaServerMongoDBBackup",
        }
    }

    /// API version of on-demand backups (stable across operator versions)
    pub fn backup_api_version(self) -> &'static str {
        match self {
            Engine::Pxc => "pxc.percona.com/v1",
            Engine::Psmdb => "psmdb.percona.com/v1",
        }
    }

    /// Controller identifier found in the operator's log lines
    pub fn controller(self) -> &'static str {
        match self {
            Engine::Pxc => "perconaxtradbcluster-controller",
            Engine::Psmdb => "psmdb-controller",
        }
    }

    /// Name of the operator deployment
    pub fn operator_name(self) -> &'static str {
        match self {
            Engine::Pxc => "percona-xtradb-cluster-operator",
            Engine::Psmdb => "percona-server-mongodb-operator",
        }
    }

    /// Client port of the service endpoint
    pub fn port(self) -> u16 {
        match self {
            Engine::Pxc => 3306,
            Engine::Psmdb => 27017,
        }
    }

    /// Secret holding the system users of a cluster
    pub fn users_secret(self, cluster: &str) -> String {
        match self {
            Engine::Pxc => format!("{}-secrets", cluster),
            Engine::Psmdb => format!("{}-psmdb-secrets", cluster),
        }
    }

    /// Type reference of the cluster document for a given API version
    pub fn type_meta(self, api_version: &str) -> TypeMeta {
        TypeMeta {
            api_version: api_version.to_string(),
            kind: self.kind().to_string(),
        }
    }

    /// Type reference of on-demand backups
    pub fn backup_type_meta(self) -> TypeMeta {
        TypeMeta {
            api_version: self.backup_api_version().to_string(),
            kind: self.backup_kind().to_string(),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pxc" | "mysql" => Ok(Engine::Pxc),
            "psmdb" | "mongodb" => Ok(Engine::Psmdb),
            other => Err(Error::config(format!(
                "Unknown engine '{}': must be one of: pxc, psmdb",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_parses_aliases() {
        assert_eq!("mysql".parse::<Engine>().unwrap(), Engine::Pxc);
        assert_eq!("PSMDB".parse::<Engine>().unwrap(), Engine::Psmdb);
        assert!("redis".parse::<Engine>().is_err());
    }

    #[test]
    fn users_secret_follows_engine_convention() {
        assert_eq!(Engine::Pxc.users_secret("db"), "db-secrets");
        assert_eq!(Engine::Psmdb.users_secret("db"), "db-psmdb-secrets");
    }
}
