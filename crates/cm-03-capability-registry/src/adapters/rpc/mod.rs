//! # Registry over RPC
//!
//! Handles returned across the wire are [`EndpointHandle`]s; the client
//! dials them with its own broker, so only TCP endpoints are usable from
//! another process.
//!
//! `add` through the client publishes the capability on the client's own
//! broker and registers the resulting handle remotely.
//!
//! [`EndpointHandle`]: cm_02_rpc_bridge::EndpointHandle

pub mod client;
pub mod server;
pub mod wire;

#[cfg(test)]
mod tests;

pub use client::RegistryClient;
pub use server::RegistryService;
