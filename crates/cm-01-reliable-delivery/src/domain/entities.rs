//! # Pending Events
//!
//! One `PendingEvent` exists per (trigger, workflow, event) key from the
//! moment the event is handed to the engine until it is acknowledged or
//! declared lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Composite primary key of a pending event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub trigger_id: String,
    pub workflow_id: String,
    pub event_id: String,
}

impl EventKey {
    pub fn new(
        trigger_id: impl Into<String>,
        workflow_id: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            workflow_id: workflow_id.into(),
            event_id: event_id.into(),
        }
    }

    /// Whether this key belongs to the given subscription.
    pub fn is_for(&self, trigger_id: &str, workflow_id: &str) -> bool {
        self.trigger_id == trigger_id && self.workflow_id == workflow_id
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.trigger_id, self.workflow_id, self.event_id)
    }
}

/// An event awaiting acknowledgement by one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub trigger_id: String,
    pub workflow_id: String,
    pub event_id: String,
    /// Identifies the encoding of `payload`.
    pub any_type_url: String,
    pub payload: Vec<u8>,
    /// When the event was first handed to the engine. Never moves forward.
    pub first_at: DateTime<Utc>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub attempts: u32,
}

impl PendingEvent {
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.trigger_id, &self.workflow_id, &self.event_id)
    }

    /// Apply upsert semantics: replace the body and the send bookkeeping,
    /// keep the earliest `first_at`.
    pub fn merge_from(&mut self, newer: PendingEvent) {
        let first_at = self.first_at.min(newer.first_at);
        *self = newer;
        self.first_at = first_at;
    }

    /// Time since the event was first handed over.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        elapsed(now, self.first_at)
    }

    /// Whether a (re)send is due given the retransmit interval.
    pub fn is_due(&self, now: DateTime<Utc>, retransmit_interval: Duration) -> bool {
        match self.last_sent_at {
            None => true,
            Some(last) => elapsed(now, last) >= retransmit_interval,
        }
    }
}

/// `now - then`, clamped at zero for clocks that moved backwards.
pub fn elapsed(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}
