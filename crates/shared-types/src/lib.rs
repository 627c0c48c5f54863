//! # Shared Types Crate
//!
//! Domain types shared by every crate of the capability layer.
//!
//! ## Contents
//!
//! - **Identity**: `CapabilityInfo`, `CapabilityType`, id validation
//! - **Topology**: `Don`, `Node`, `PeerId` and their wire forms
//! - **Messages**: requests, responses and trigger events
//! - **Contracts**: `TriggerCapability`, `ExecutableCapability` and the
//!   closed `Capability` union
//! - **Errors**: the origin/visibility/code taxonomy used at every boundary
//! - **Metrics**: the injected `MetricsSink` port
//!
//! ## Design Principles
//!
//! - **Pure data**: nothing here performs I/O.
//! - **Fail fast**: malformed ids, types and configs are rejected at
//!   construction time.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod capability;
pub mod entities;
pub mod errors;
pub mod messages;
pub mod metrics;
pub mod topology;

pub use capability::{
    BaseCapability, Capability, ExecutableCapability, TriggerCapability, TRIGGER_CHANNEL_CAPACITY,
};
pub use entities::{validate_capability_id, CapabilityInfo, CapabilityType, MAX_CAPABILITY_ID_LENGTH};
pub use errors::{CapabilityError, ErrorCode, Origin, Visibility, REDACTED_ERROR_MESSAGE};
pub use messages::{
    decode_config, AckEventRequest, CapabilityRequest, CapabilityResponse, RegistrationMetadata,
    RegistrationRequest, RequestMetadata, TriggerEvent, TriggerRegistrationRequest,
    TriggerResponse, ValueMap,
};
pub use metrics::{MetricsSink, NoopMetrics};
pub use topology::{Don, DonWire, Node, NodeWire, PeerId, PEER_ID_LENGTH};
