//! Prometheus metrics for the DBaaS engine
//!
//! Counters and histograms cover lifecycle operations and the poll loop that
//! drives them to a terminal state.

mod prometheus;

pub use prometheus::*;
