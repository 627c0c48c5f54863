//! # Adapters Module
//!
//! Implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `memory`: in-process `EventStore`
//! - `rocksdb`: durable `EventStore` (feature `rocksdb`)
//! - `codec`: JSON `EventCodec`
//! - `sink`: `EventSink` over a trigger response channel
//! - `clock`: manually advanced `TimeSource` for tests and simulations

pub mod clock;
pub mod codec;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;
pub mod sink;

pub use clock::ManualTimeSource;
pub use codec::{JsonEventCodec, JSON_EVENT_TYPE_URL};
pub use memory::InMemoryEventStore;
#[cfg(feature = "rocksdb")]
pub use rocksdb::{RocksDbEventStore, RocksDbEventStoreConfig};
pub use sink::ChannelSink;
