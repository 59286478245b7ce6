//! Per-cluster single-writer guard

use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

use crate::crd::Engine;
use crate::error::{Error, Result};
use crate::metrics;

/// Clusters with a lifecycle operation currently running
#[derive(Clone, Debug, Default)]
pub struct InFlight {
    keys: Arc<DashSet<String>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(engine: Engine, cluster: &str) -> String {
        format!("{}/{}", engine, cluster)
    }

    /// Claim a cluster; fails if another operation holds it
    pub fn acquire(&self, engine: Engine, cluster: &str) -> Result<InFlightGuard> {
        let key = Self::key(engine, cluster);
        if !self.keys.insert(key.clone()) {
            return Err(Error::OperationInProgress { key });
        }

        debug!(key = %key, "Acquired cluster");
        metrics::IN_FLIGHT
            .with_label_values(&[engine.as_str()])
            .inc();
        Ok(InFlightGuard {
            keys: self.keys.clone(),
            key,
            engine,
        })
    }

    pub fn contains(&self, engine: Engine, cluster: &str) -> bool {
        self.keys.contains(&Self::key(engine, cluster))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Releases the cluster when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<DashSet<String>>,
    key: String,
    engine: Engine,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
        metrics::IN_FLIGHT
            .with_label_values(&[self.engine.as_str()])
            .dec();
        debug!(key = %self.key, "Released cluster");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let in_flight = InFlight::new();
        let guard = in_flight.acquire(Engine::Pxc, "orders").unwrap();

        let err = in_flight.acquire(Engine::Pxc, "orders").unwrap_err();
        assert!(matches!(err, Error::OperationInProgress { ref key } if key == "pxc/orders"));

        // Same name on another engine is a different cluster
        let other = in_flight.acquire(Engine::Psmdb, "orders").unwrap();
        assert_eq!(in_flight.len(), 2);

        drop(guard);
        drop(other);
        assert!(in_flight.is_empty());
        assert!(in_flight.acquire(Engine::Pxc, "orders").is_ok());
    }
}
