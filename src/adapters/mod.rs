//! Adapters between user input, the platform and the engine's config types

mod cluster_config;
mod kube_store;
mod options;
pub mod quantity;
mod secrets;
mod store;

pub use cluster_config::*;
pub use kube_store::*;
pub use options::*;
pub use secrets::*;
pub use store::*;
