//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the delivery engine requires from its host.

use crate::domain::entities::{EventKey, PendingEvent};
use crate::domain::errors::{DeliveryError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::TriggerEvent;

/// Persistence for undelivered trigger events.
///
/// Production: `RocksDbEventStore` (feature `rocksdb`)
/// Testing: `InMemoryEventStore`
///
/// Implementations must be safe for concurrent calls; the engine never
/// holds its own index lock while calling into the store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Upsert a record.
    ///
    /// On conflict the payload, type url, `last_sent_at` and `attempts` are
    /// replaced while `first_at` keeps the minimum of old and new.
    async fn insert(&self, record: PendingEvent) -> Result<(), StoreError>;

    /// All records, oldest `first_at` first.
    async fn list(&self) -> Result<Vec<PendingEvent>, StoreError>;

    /// Remove a record. Deleting an unknown key succeeds.
    async fn delete(&self, key: &EventKey) -> Result<(), StoreError>;
}

/// Downstream subscriber of one (trigger, workflow) pair.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: TriggerEvent) -> Result<(), DeliveryError>;
}

/// Converts trigger events to and from their persisted form.
pub trait EventCodec: Send + Sync {
    /// Returns the type url and the encoded body.
    fn encode(&self, event: &TriggerEvent) -> Result<(String, Vec<u8>), DeliveryError>;

    fn decode(&self, type_url: &str, payload: &[u8]) -> Result<TriggerEvent, DeliveryError>;
}

/// Abstract clock, so retransmit and loss decisions are testable.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
