//! # Node Runtime Library
//!
//! Wires a capability-mesh node from its configuration. The binary in
//! `main.rs` is a thin shell around [`NodeRuntime`].
//!
//! ## Modular Structure
//!
//! - `container/` - Node configuration and component construction
//! - `adapters/`  - Capabilities the node publishes itself (heartbeat)
//! - `runtime`    - Start-up, the registry RPC listener and shutdown

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod container;
pub mod runtime;

pub use adapters::{HeartbeatTrigger, HEARTBEAT_CAPABILITY_ID};
pub use container::{ConfigError, NodeComponents, NodeConfig, StoreBackend};
pub use runtime::NodeRuntime;

use cm_01_reliable_delivery::{DeliveryError, StoreError};
use cm_03_capability_registry::RegistryError;
use shared_types::CapabilityError;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures while building, starting or running the node.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("failed to bind registry listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("node runtime already started")]
    AlreadyStarted,
}
