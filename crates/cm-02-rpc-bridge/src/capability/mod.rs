//! # Capability Bridge
//!
//! Server and client halves that carry the capability contracts over the
//! RPC transport.
//!
//! - `server` - `CapabilityService` exposes a local [`shared_types::Capability`]
//! - `client` - `CapabilityClient` implements the contracts against a remote one
//! - `wire` - method names and message shapes

pub mod client;
pub mod server;
pub mod wire;


pub use client::CapabilityClient;
pub use server::{CapabilityService, ServerOptions};
pub use wire::{ExecuteReply, TriggerStreamItem};
