//! Percona DBaaS engine
//!
//! Synthesizes versioned cluster documents for operator-managed databases,
//! submits them, and classifies the platform's status and operator logs
//! into a normalized lifecycle state.

pub mod adapters;
pub mod builders;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod settings;

pub use error::{Error, Result};
