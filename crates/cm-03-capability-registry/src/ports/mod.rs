//! # Ports
//!
//! - `inbound` - `CapabilityRegistryApi`, served locally and over RPC

pub mod inbound;

pub use inbound::{CapabilityRegistryApi, RegisteredCapability};
