//! Error types for the DBaaS engine

use thiserror::Error;

/// Result type alias using the engine's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// User configuration cannot be turned into a valid document
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Create attempted against a name that is already taken
    #[error("{kind} \"{name}\" already exists. Available clusters: [{}]", existing.join(", "))]
    AlreadyExists {
        kind: String,
        name: String,
        existing: Vec<String>,
    },

    /// Object missing from the store
    #[error("Unable to find {kind} \"{name}\"")]
    NotFound { kind: String, name: String },

    /// Status payload could not be decoded
    #[error("Unable to decode cluster status: {0}")]
    StatusDecode(#[source] serde_json::Error),

    /// Operator log stream could not be decoded
    #[error("Unable to decode operator log entry: {0}")]
    LogDecode(#[source] serde_json::Error),

    /// Poll budget exhausted before the cluster settled
    #[error("Cluster did not reach a terminal state after {attempts} status checks")]
    ReconcileExhausted { attempts: u32 },

    /// Requested engine/operator version is not registered
    #[error("Unknown {engine} operator version '{version}'")]
    UnknownVersion { engine: String, version: String },

    /// The platform reported the cluster in error state
    #[error("Cluster failed: {}", messages.join(", "))]
    ClusterFailed { messages: Vec<String> },

    /// Another lifecycle operation holds the same cluster
    #[error("Another operation is already running against {key}")]
    OperationInProgress { key: String },

    /// The operation was cancelled before reaching a terminal state
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic object store failure
    #[error("Object store error: {0}")]
    Store(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::ConfigInvalid(msg.into())
    }

    /// Create an object store error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Errors a poll tick tolerates: they only consume retry budget
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StatusDecode(_)
                | Error::LogDecode(_)
                | Error::NotFound { .. }
                | Error::Store(_)
                | Error::Kube(_)
        )
    }

    /// Short label used for metrics and structured logs
    pub fn label(&self) -> &'static str {
        match self {
            Error::ConfigInvalid(_) => "config_invalid",
            Error::AlreadyExists { .. } => "already_exists",
            Error::NotFound { .. } => "not_found",
            Error::StatusDecode(_) => "status_decode",
            Error::LogDecode(_) => "log_decode",
            Error::ReconcileExhausted { .. } => "exhausted",
            Error::UnknownVersion { .. } => "unknown_version",
            Error::ClusterFailed { .. } => "cluster_failed",
            Error::OperationInProgress { .. } => "in_progress",
            Error::Cancelled => "cancelled",
            Error::Store(_) | Error::Kube(_) => "store",
            Error::Serialization(_) | Error::Yaml(_) | Error::Io(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_lists_clusters() {
        let err = Error::AlreadyExists {
            kind: "PerconaXtraDBCluster".to_string(),
            name: "db".to_string(),
            existing: vec!["db".to_string(), "other".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("\"db\" already exists"));
        assert!(text.contains("[db, other]"));
    }

    #[test]
    fn decode_errors_are_transient() {
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(Error::StatusDecode(decode).is_transient());
        assert!(!Error::config("bad").is_transient());
        assert!(!Error::ReconcileExhausted { attempts: 3 }.is_transient());
    }
}
