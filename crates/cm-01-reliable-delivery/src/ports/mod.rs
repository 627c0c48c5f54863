//! # Ports Layer
//!
//! Driven ports of the reliable delivery engine.
//!
//! - `outbound.rs` - event persistence, subscriber sinks, payload codec, clock

pub mod outbound;

pub use outbound::{EventCodec, EventSink, EventStore, SystemTimeSource, TimeSource};
