//! # Reliable Trigger Delivery
//!
//! Guarantees that a trigger event handed to the engine for a given
//! (trigger, workflow, event) key reaches the subscriber at least once,
//! survives process restarts and is retried until acknowledged or declared
//! lost.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  fire   ┌─────────────────────────┐  insert/list/delete  ┌────────────┐
//! │ Trigger (cron,   │ ──────► │ ReliableDeliveryEngine  │ ───────────────────► │ EventStore │
//! │ heartbeat, ...)  │         │  pending index + timer  │                      └────────────┘
//! └──────────────────┘         └───────────┬─────────────┘
//!                                          │ send (per trigger, workflow)
//!                                          ▼
//!                                   ┌──────────────┐
//!                                   │  EventSink   │ ──► subscriber channel
//!                                   └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Write-ahead: an event is persisted before the first send attempt.
//! - Ack is idempotent.
//! - Retransmit cycle every `retransmit_interval / 2`; a record is resent
//!   once `retransmit_interval` has passed since the last attempt.
//! - Records older than `max_age` are dropped and reported once through the
//!   lost hook.
//! - `start()` recovers the store and sends every record once before the
//!   first tick.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{ChannelSink, InMemoryEventStore, JsonEventCodec, ManualTimeSource};
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbEventStore, RocksDbEventStoreConfig};
pub use domain::entities::{EventKey, PendingEvent};
pub use domain::errors::{DeliveryError, StoreError};
pub use domain::value_objects::{DeliveryConfig, DEFAULT_MAX_EVENT_AGE, DEFAULT_RETRANSMIT_INTERVAL};
pub use ports::{EventCodec, EventSink, EventStore, SystemTimeSource, TimeSource};
pub use service::{BaseTriggerCapability, DeliveryEngineBuilder, LostHook, ReliableDeliveryEngine};
