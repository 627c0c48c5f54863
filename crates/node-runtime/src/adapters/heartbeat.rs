//! # Heartbeat Trigger
//!
//! Emits one trigger event per interval to every registered workflow.
//! Events go through [`BaseTriggerCapability`], so they are persisted and
//! retransmitted until acknowledged like any other trigger's.

use chrono::Utc;
use cm_01_reliable_delivery::{BaseTriggerCapability, DeliveryError, ReliableDeliveryEngine};
use serde_json::json;
use shared_types::{CapabilityError, CapabilityInfo, CapabilityType, TriggerEvent, ValueMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const HEARTBEAT_CAPABILITY_ID: &str = "heartbeat-trigger@1.0.0";

pub struct HeartbeatTrigger {
    base: Arc<BaseTriggerCapability>,
    interval: Duration,
    sequence: AtomicU64,
}

impl HeartbeatTrigger {
    pub fn new(
        engine: Arc<ReliableDeliveryEngine>,
        interval: Duration,
    ) -> Result<Self, CapabilityError> {
        let info = CapabilityInfo::new(
            HEARTBEAT_CAPABILITY_ID,
            CapabilityType::Trigger,
            "Fires an event at a fixed interval",
        )?;
        Ok(Self {
            base: Arc::new(BaseTriggerCapability::new(info, engine)?),
            interval,
            sequence: AtomicU64::new(0),
        })
    }

    /// The capability to publish in the registry.
    pub fn capability(&self) -> Arc<BaseTriggerCapability> {
        self.base.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fire one heartbeat now.
    ///
    /// Returns the number of registrations it was handed to.
    pub async fn beat(&self) -> Result<usize, DeliveryError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut outputs = ValueMap::new();
        outputs.insert("sequence".into(), json!(sequence));
        outputs.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));

        let event = TriggerEvent {
            trigger_type: HEARTBEAT_CAPABILITY_ID.to_string(),
            id: Uuid::new_v4().to_string(),
            outputs,
        };
        self.base.fire(event).await
    }

    /// Beat every interval until `shutdown` fires. The first beat is one
    /// interval after the call.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                capability_id = HEARTBEAT_CAPABILITY_ID,
                interval_ms = self.interval.as_millis() as u64,
                "[Heartbeat] Started"
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.beat().await {
                            Ok(0) => {}
                            Ok(count) => debug!(registrations = count, "[Heartbeat] Beat"),
                            Err(e) => warn!(error = %e, "[Heartbeat] Beat not persisted"),
                        }
                    }
                }
            }
            debug!("[Heartbeat] Stopped");
        })
    }
}
