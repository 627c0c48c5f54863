//! # Capability Registry
//!
//! Discovers capabilities by id and publishes each one on its own
//! dynamically allocated RPC endpoint.
//!
//! ## Architecture
//!
//! ```text
//! add(capability) ──► CapabilityService ──► EndpointBroker::serve ──► id → EndpointHandle
//!                                                                          │
//! get / get_trigger / get_executable / list ◄── CapabilityClient ◄── dial ─┘
//! ```
//!
//! - Typed lookups check the registered type against the requested
//!   contract before dialing.
//! - Every lookup dials a new connection; nothing is cached.
//! - `list` closes everything it dialed if any single dial fails.
//! - Per-DON configuration falls back to defaults for the capability type.
//! - [`RegistryService`] and [`RegistryClient`] expose the same API across
//!   processes; both sides implement [`CapabilityRegistryApi`].

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{RegistryClient, RegistryService};
pub use domain::config::{
    CapabilityConfiguration, RemoteConfig, RemoteExecutableConfig, RemoteTargetConfig,
    RemoteTriggerConfig, TransmissionSchedule,
};
pub use domain::errors::RegistryError;
pub use ports::{CapabilityRegistryApi, RegisteredCapability};
pub use service::{CapabilityRegistry, RegistryEntry};
