//! Classification of what the platform reports back
//!
//! This module turns raw payloads into engine-neutral events:
//! - status objects into a [`ClusterState`] plus messages
//! - operator log batches into deduplicated [`OutputMsg`] progress
//! - known scheduler failures into guidance naming the flag to change

mod handle;
mod logs;
mod messages;
mod status;

pub use handle::*;
pub use logs::*;
pub use messages::rewrite as rewrite_status_message;
pub use status::*;
