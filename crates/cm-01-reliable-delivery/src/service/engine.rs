//! # Reliable Delivery Engine
//!
//! Write-ahead, at-least-once delivery of trigger events.
//!
//! ## Lifecycle of an event key
//!
//! ```text
//! deliver_event ──► Pending(first_at, last_sent_at, attempts)
//!                      │            │
//!               ack_event       age ≥ max_age
//!                      ▼            ▼
//!                    Acked        Lost (lost hook, once)
//! ```
//!
//! ## Locking
//!
//! The pending index is guarded by a mutex held only for index mutations.
//! Store calls and sink sends happen outside the critical section; after a
//! store write the index is re-checked so an ack racing with a resend never
//! resurrects the record.

use crate::adapters::codec::JsonEventCodec;
use crate::domain::entities::{EventKey, PendingEvent};
use crate::domain::errors::DeliveryError;
use crate::domain::value_objects::DeliveryConfig;
use crate::ports::{EventCodec, EventSink, EventStore, SystemTimeSource, TimeSource};
use parking_lot::{Mutex, RwLock};
use shared_types::metrics::names;
use shared_types::{MetricsSink, NoopMetrics, TriggerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Invoked exactly once for every event given up on.
pub type LostHook = Arc<dyn Fn(&PendingEvent) + Send + Sync>;

type SubscriptionKey = (String, String);

/// Builder for [`ReliableDeliveryEngine`].
pub struct DeliveryEngineBuilder {
    name: String,
    store: Arc<dyn EventStore>,
    config: DeliveryConfig,
    codec: Arc<dyn EventCodec>,
    time_source: Arc<dyn TimeSource>,
    metrics: Arc<dyn MetricsSink>,
    lost_hook: Option<LostHook>,
}

impl DeliveryEngineBuilder {
    /// Name used in logs and metric labels; usually the trigger capability id.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: DeliveryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn EventCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn lost_hook(mut self, hook: LostHook) -> Self {
        self.lost_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<ReliableDeliveryEngine, DeliveryError> {
        self.config.validate()?;
        Ok(ReliableDeliveryEngine {
            inner: Arc::new(EngineInner {
                name: self.name,
                config: self.config,
                store: self.store,
                codec: self.codec,
                time_source: self.time_source,
                metrics: self.metrics,
                lost_hook: self.lost_hook,
                pending: Mutex::new(HashMap::new()),
                sinks: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
            task: Mutex::new(None),
            started: Mutex::new(false),
        })
    }
}

/// At-least-once trigger event delivery.
pub struct ReliableDeliveryEngine {
    inner: Arc<EngineInner>,
    task: Mutex<Option<JoinHandle<()>>>,
    started: Mutex<bool>,
}

struct EngineInner {
    name: String,
    config: DeliveryConfig,
    store: Arc<dyn EventStore>,
    codec: Arc<dyn EventCodec>,
    time_source: Arc<dyn TimeSource>,
    metrics: Arc<dyn MetricsSink>,
    lost_hook: Option<LostHook>,
    pending: Mutex<HashMap<EventKey, PendingEvent>>,
    sinks: RwLock<HashMap<SubscriptionKey, Arc<dyn EventSink>>>,
    shutdown: CancellationToken,
}

impl ReliableDeliveryEngine {
    pub fn builder(store: Arc<dyn EventStore>) -> DeliveryEngineBuilder {
        DeliveryEngineBuilder {
            name: "delivery".to_string(),
            store,
            config: DeliveryConfig::default(),
            codec: Arc::new(JsonEventCodec),
            time_source: Arc::new(SystemTimeSource),
            metrics: NoopMetrics::shared(),
            lost_hook: None,
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.inner.config
    }

    /// Recover pending events from the store, send each once, then start the
    /// background retransmit cycle.
    pub async fn start(&self) -> Result<(), DeliveryError> {
        {
            let mut started = self.started.lock();
            if *started {
                return Err(DeliveryError::AlreadyStarted);
            }
            *started = true;
        }

        let recovered = self.inner.store.list().await?;
        let keys: Vec<EventKey> = {
            let mut pending = self.inner.pending.lock();
            recovered
                .into_iter()
                .map(|record| {
                    let key = record.key();
                    pending.entry(key.clone()).or_insert(record);
                    key
                })
                .collect()
        };
        info!(
            engine = %self.inner.name,
            recovered = keys.len(),
            "[Delivery] Starting, recovered pending events"
        );

        for key in &keys {
            self.inner.attempt_send(key).await;
        }
        self.inner.report_pending();

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run_retransmit_loop().await });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stop the retransmit cycle and wait for it to exit.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(engine = %self.inner.name, error = %e, "[Delivery] Retransmit task ended abnormally");
            }
        }
        debug!(engine = %self.inner.name, "[Delivery] Closed");
    }

    /// Token cancelled when the engine closes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Persist `event` for every workflow, then attempt delivery.
    ///
    /// Returns once persistence succeeded; send failures are left to the
    /// retransmit cycle.
    pub async fn deliver_event(
        &self,
        trigger_id: &str,
        event: TriggerEvent,
        workflow_ids: &[String],
    ) -> Result<(), DeliveryError> {
        let (any_type_url, payload) = self.inner.codec.encode(&event)?;
        let now = self.inner.time_source.now();

        let mut keys = Vec::with_capacity(workflow_ids.len());
        for workflow_id in workflow_ids {
            let record = PendingEvent {
                trigger_id: trigger_id.to_string(),
                workflow_id: workflow_id.clone(),
                event_id: event.id.clone(),
                any_type_url: any_type_url.clone(),
                payload: payload.clone(),
                first_at: now,
                last_sent_at: None,
                attempts: 0,
            };
            let key = record.key();

            self.inner.store.insert(record.clone()).await?;
            {
                let mut pending = self.inner.pending.lock();
                match pending.get_mut(&key) {
                    Some(existing) => existing.merge_from(record),
                    None => {
                        pending.insert(key.clone(), record);
                    }
                }
            }
            self.inner.metrics.increment(
                names::TRIGGER_EVENTS_PERSISTED,
                &[("engine", self.inner.name.as_str())],
            );
            keys.push(key);
        }

        for key in &keys {
            self.inner.attempt_send(key).await;
        }
        self.inner.report_pending();
        Ok(())
    }

    /// Forget an event for one workflow. Unknown keys are not an error.
    pub async fn ack_event(
        &self,
        trigger_id: &str,
        workflow_id: &str,
        event_id: &str,
    ) -> Result<(), DeliveryError> {
        let key = EventKey::new(trigger_id, workflow_id, event_id);
        let removed = self.inner.pending.lock().remove(&key);
        self.inner.store.delete(&key).await?;

        if removed.is_some() {
            self.inner
                .metrics
                .increment(names::TRIGGER_EVENTS_ACKED, &[("engine", self.inner.name.as_str())]);
            debug!(engine = %self.inner.name, event = %key, "[Delivery] Event acknowledged");
            self.inner.report_pending();
        }
        Ok(())
    }

    /// Attach the subscriber of (trigger, workflow) and immediately resend
    /// anything still pending for it.
    pub async fn register(
        &self,
        trigger_id: &str,
        workflow_id: &str,
        sink: Arc<dyn EventSink>,
    ) {
        self.inner
            .sinks
            .write()
            .insert((trigger_id.to_string(), workflow_id.to_string()), sink);

        let mut backlog: Vec<PendingEvent> = self
            .inner
            .pending
            .lock()
            .values()
            .filter(|r| r.key().is_for(trigger_id, workflow_id))
            .cloned()
            .collect();
        backlog.sort_by(|a, b| a.first_at.cmp(&b.first_at));

        if !backlog.is_empty() {
            debug!(
                engine = %self.inner.name,
                trigger_id,
                workflow_id,
                backlog = backlog.len(),
                "[Delivery] Flushing backlog to new subscriber"
            );
        }
        for record in backlog {
            self.inner.attempt_send(&record.key()).await;
        }
    }

    /// Detach a subscriber. Pending events stay pending.
    pub fn unregister(&self, trigger_id: &str, workflow_id: &str) -> Option<Arc<dyn EventSink>> {
        self.inner
            .sinks
            .write()
            .remove(&(trigger_id.to_string(), workflow_id.to_string()))
    }

    /// Run one retransmit cycle now.
    pub async fn retransmit_pending(&self) {
        self.inner.retransmit_pending().await;
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Snapshot of the pending index, oldest first.
    pub fn pending_events(&self) -> Vec<PendingEvent> {
        let mut all: Vec<PendingEvent> = self.inner.pending.lock().values().cloned().collect();
        all.sort_by(|a, b| a.first_at.cmp(&b.first_at).then_with(|| a.key().cmp(&b.key())));
        all
    }
}

impl EngineInner {
    async fn run_retransmit_loop(&self) {
        let period = self.config.tick_period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(engine = %self.name, "[Delivery] Retransmit loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.retransmit_pending().await;
                }
            }
        }
    }

    async fn retransmit_pending(&self) {
        let now = self.time_source.now();
        let mut snapshot: Vec<PendingEvent> = self.pending.lock().values().cloned().collect();
        snapshot.sort_by(|a, b| a.first_at.cmp(&b.first_at));

        for record in snapshot {
            if self.shutdown.is_cancelled() {
                return;
            }
            let key = record.key();
            if record.age(now) >= self.config.max_age {
                self.expire(&key).await;
            } else if record.is_due(now, self.config.retransmit_interval) {
                self.attempt_send(&key).await;
            }
        }
        self.report_pending();
    }

    async fn expire(&self, key: &EventKey) {
        // Only the caller that removes the record reports it.
        let Some(record) = self.pending.lock().remove(key) else {
            return;
        };
        if let Err(e) = self.store.delete(key).await {
            warn!(engine = %self.name, event = %key, error = %e, "[Delivery] Failed to delete lost event");
        }

        warn!(
            engine = %self.name,
            event = %key,
            attempts = record.attempts,
            "[Delivery] Event exceeded max age without acknowledgement, giving up"
        );
        self.metrics
            .increment(names::TRIGGER_EVENTS_LOST, &[("engine", self.name.as_str())]);
        if let Some(hook) = &self.lost_hook {
            hook(&record);
        }
    }

    async fn attempt_send(&self, key: &EventKey) {
        let Some(record) = self.pending.lock().get(key).cloned() else {
            return;
        };
        let sink = self
            .sinks
            .read()
            .get(&(key.trigger_id.clone(), key.workflow_id.clone()))
            .cloned();
        let Some(sink) = sink else {
            debug!(engine = %self.name, event = %key, "[Delivery] No subscriber, event stays pending");
            return;
        };

        let event = match self.codec.decode(&record.any_type_url, &record.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(engine = %self.name, event = %key, error = %e, "[Delivery] Cannot decode pending event");
                return;
            }
        };

        let now = self.time_source.now();
        self.metrics
            .increment(names::TRIGGER_EVENTS_SENT, &[("engine", self.name.as_str())]);
        if let Err(e) = sink.send(event).await {
            self.metrics
                .increment(names::TRIGGER_SEND_FAILURES, &[("engine", self.name.as_str())]);
            warn!(engine = %self.name, event = %key, error = %e, "[Delivery] Send failed, will retry");
        }

        let updated = {
            let mut pending = self.pending.lock();
            let Some(entry) = pending.get_mut(key) else {
                // Acked while sending.
                return;
            };
            entry.last_sent_at = Some(now);
            entry.attempts = entry.attempts.saturating_add(1);
            entry.clone()
        };

        if let Err(e) = self.store.insert(updated).await {
            warn!(engine = %self.name, event = %key, error = %e, "[Delivery] Failed to record send attempt");
        }
        if !self.pending.lock().contains_key(key) {
            if let Err(e) = self.store.delete(key).await {
                warn!(engine = %self.name, event = %key, error = %e, "[Delivery] Failed to delete acked event");
            }
        }
    }

    fn report_pending(&self) {
        let count = self.pending.lock().len();
        self.metrics
            .set_gauge(names::TRIGGER_PENDING, &[("engine", self.name.as_str())], count as f64);
    }
}

impl Drop for ReliableDeliveryEngine {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
