//! # Adapters
//!
//! - `rpc` - registry served over the RPC bridge (`RegistryService`) and
//!   its client (`RegistryClient`)

pub mod rpc;

pub use rpc::{RegistryClient, RegistryService};
