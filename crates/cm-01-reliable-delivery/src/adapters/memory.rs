//! In-memory event store.

use crate::domain::entities::{EventKey, PendingEvent};
use crate::domain::errors::StoreError;
use crate::ports::EventStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Volatile `EventStore`; contents are lost with the process.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    records: RwLock<HashMap<EventKey, PendingEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, key: &EventKey) -> Option<PendingEvent> {
        self.records.read().get(key).cloned()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, record: PendingEvent) -> Result<(), StoreError> {
        let mut records = self.records.write();
        match records.get_mut(&record.key()) {
            Some(existing) => existing.merge_from(record),
            None => {
                records.insert(record.key(), record);
            }
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingEvent>, StoreError> {
        let mut all: Vec<PendingEvent> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| a.first_at.cmp(&b.first_at).then_with(|| a.key().cmp(&b.key())));
        Ok(all)
    }

    async fn delete(&self, key: &EventKey) -> Result<(), StoreError> {
        self.records.write().remove(key);
        Ok(())
    }
}
