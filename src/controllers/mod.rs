//! Lifecycle controllers
//!
//! This module runs lifecycle operations against the object store and
//! reports their progress over an [`OperationHandle`].

mod handle;
mod inflight;
mod lifecycle;
mod poller;

pub use handle::{OperationHandle, OperationOutcome};
pub use inflight::{InFlight, InFlightGuard};
pub use lifecycle::Lifecycle;

use std::sync::Arc;

use crate::adapters::ObjectStore;
use crate::builders::VersionRegistry;
use crate::settings::EngineSettings;

/// Shared context for all operations
pub struct Context {
    /// Transport to the orchestration platform
    pub store: Arc<dyn ObjectStore>,
    pub registry: Arc<VersionRegistry>,
    pub settings: EngineSettings,
    /// Clusters with an operation running
    pub in_flight: InFlight,
}

impl Context {
    /// Create a new context
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<VersionRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
            in_flight: InFlight::new(),
        }
    }
}
