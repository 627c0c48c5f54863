//! # RPC Bridge
//!
//! Makes capabilities callable across a process boundary as if they were
//! local.
//!
//! ## Architecture
//!
//! ```text
//! CapabilityClient ──► RpcClient ══ frames ══► serve_connection ──► CapabilityService ──► Capability
//!        ▲                 (TCP socket or in-process pipe)                                   │
//!        └──────────────── trigger items / execute reply ◄──────────────────────────────────┘
//! ```
//!
//! - **Execute** is a one-item stream. Application errors travel inside the
//!   reply so the caller sees the full error taxonomy.
//! - **RegisterTrigger** is an open-ended stream. The client republishes
//!   items onto a local channel and tells a clean end apart from a
//!   transport failure (one trailing error item).
//! - [`EndpointBroker`] publishes services on freshly allocated endpoints
//!   and dials them.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod capability;
pub mod errors;
pub mod transport;

pub use broker::{BrokerConfig, BrokerTransport, EndpointAddress, EndpointBroker, EndpointHandle};
pub use capability::{CapabilityClient, CapabilityService, ExecuteReply, ServerOptions, TriggerStreamItem};
pub use errors::{BrokerError, RpcError};
pub use transport::{
    serve_connection, ClientStream, InboundCall, Responder, RpcClient, RpcService, StreamEnd,
    StreamEvent,
};
