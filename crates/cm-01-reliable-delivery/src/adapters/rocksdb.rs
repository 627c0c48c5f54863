//! # RocksDB Event Store
//!
//! Durable `EventStore`. One key per pending event:
//!
//! ```text
//! "pe:" | len(trigger_id) u32 BE | trigger_id | len(workflow_id) | workflow_id | len(event_id) | event_id
//! ```
//!
//! Values are bincode-encoded `PendingEvent`s. Blocking RocksDB calls run on
//! the tokio blocking pool.

use crate::domain::entities::{EventKey, PendingEvent};
use crate::domain::errors::StoreError;
use crate::ports::EventStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, WriteOptions, DB};
use std::sync::Arc;

const KEY_PREFIX: &[u8] = b"pe:";

/// RocksDB configuration for the event store.
#[derive(Debug, Clone)]
pub struct RocksDbEventStoreConfig {
    /// Path to the database directory
    pub path: String,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// fsync after each write (default: true for durability)
    pub sync_writes: bool,
}

impl Default for RocksDbEventStoreConfig {
    fn default() -> Self {
        Self {
            path: "./data/events".to_string(),
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbEventStoreConfig {
    /// Create config for testing (small buffers, no sync)
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            write_buffer_size: 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed pending event store.
pub struct RocksDbEventStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbEventStoreConfig,
}

impl RocksDbEventStore {
    /// Open or create the database
    pub fn open(config: RocksDbEventStoreConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = DB::open(&opts, &config.path).map_err(|e| StoreError::Io {
            message: format!("Failed to open RocksDB: {}", e),
        })?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DB, WriteOptions) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        let write_opts = self.write_options();
        tokio::task::spawn_blocking(move || {
            // Writers take the exclusive lock so upserts are read-modify-write atomic.
            let guard = db.write();
            op(&guard, write_opts)
        })
        .await
        .map_err(|e| StoreError::Io {
            message: format!("RocksDB task failed: {}", e),
        })?
    }
}

fn encode_key(key: &EventKey) -> Vec<u8> {
    let parts = [&key.trigger_id, &key.workflow_id, &key.event_id];
    let mut out = Vec::with_capacity(
        KEY_PREFIX.len() + parts.iter().map(|p| p.len() + 4).sum::<usize>(),
    );
    out.extend_from_slice(KEY_PREFIX);
    for part in parts {
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part.as_bytes());
    }
    out
}

fn encode_value(record: &PendingEvent) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(record).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

fn decode_value(bytes: &[u8]) -> Result<PendingEvent, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

fn io_error(op: &str, e: rocksdb::Error) -> StoreError {
    StoreError::Io {
        message: format!("RocksDB {} failed: {}", op, e),
    }
}

#[async_trait]
impl EventStore for RocksDbEventStore {
    async fn insert(&self, record: PendingEvent) -> Result<(), StoreError> {
        self.blocking(move |db, write_opts| {
            let key = encode_key(&record.key());
            let merged = match db.get(&key).map_err(|e| io_error("get", e))? {
                Some(existing) => {
                    let mut existing = decode_value(&existing)?;
                    existing.merge_from(record);
                    existing
                }
                None => record,
            };
            db.put_opt(&key, encode_value(&merged)?, &write_opts)
                .map_err(|e| io_error("put", e))
        })
        .await
    }

    async fn list(&self) -> Result<Vec<PendingEvent>, StoreError> {
        self.blocking(|db, _| {
            let mut records = Vec::new();
            let iter = db.iterator(IteratorMode::From(KEY_PREFIX, rocksdb::Direction::Forward));
            for item in iter {
                let (key, value) = item.map_err(|e| io_error("scan", e))?;
                if !key.starts_with(KEY_PREFIX) {
                    break;
                }
                records.push(decode_value(&value)?);
            }
            records.sort_by(|a, b| a.first_at.cmp(&b.first_at).then_with(|| a.key().cmp(&b.key())));
            Ok(records)
        })
        .await
    }

    async fn delete(&self, key: &EventKey) -> Result<(), StoreError> {
        let key = encode_key(key);
        self.blocking(move |db, write_opts| {
            db.delete_opt(&key, &write_opts)
                .map_err(|e| io_error("delete", e))
        })
        .await
    }
}
