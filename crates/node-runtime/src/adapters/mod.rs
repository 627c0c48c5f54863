//! # Node Adapters
//!
//! Capabilities the node publishes on its own.

pub mod heartbeat;

pub use heartbeat::{HeartbeatTrigger, HEARTBEAT_CAPABILITY_ID};
