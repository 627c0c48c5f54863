//! Channel-backed event sink.

use crate::domain::errors::DeliveryError;
use crate::ports::EventSink;
use async_trait::async_trait;
use shared_types::{TriggerEvent, TriggerResponse};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Pushes events onto a subscriber's trigger response channel.
///
/// Sending never waits: a full channel is a failed attempt and the event is
/// picked up again by the retransmit cycle.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TriggerResponse>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<TriggerResponse>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, event: TriggerEvent) -> Result<(), DeliveryError> {
        self.tx
            .try_send(TriggerResponse::Event(event))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::SinkFull,
                TrySendError::Closed(_) => DeliveryError::SinkClosed,
            })
    }
}
