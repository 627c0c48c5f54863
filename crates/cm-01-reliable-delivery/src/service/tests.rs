//! # Delivery Engine Tests

use super::*;
use crate::adapters::{InMemoryEventStore, JsonEventCodec, ManualTimeSource};
use crate::domain::entities::{EventKey, PendingEvent};
use crate::domain::errors::{DeliveryError, StoreError};
use crate::domain::value_objects::DeliveryConfig;
use crate::ports::{EventCodec, EventSink, EventStore, TimeSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use shared_types::{
    AckEventRequest, CapabilityInfo, CapabilityType, ErrorCode, RequestMetadata,
    TriggerCapability, TriggerEvent, TriggerRegistrationRequest,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TRIGGER: &str = "trigger-1";
const WORKFLOW: &str = "workflow-1";

#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<TriggerEvent>>,
    failing: AtomicBool,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.received.lock().len()
    }

    fn ids(&self) -> Vec<String> {
        self.received.lock().iter().map(|e| e.id.clone()).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, event: TriggerEvent) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::SinkFull);
        }
        self.received.lock().push(event);
        Ok(())
    }
}

struct FailingStore;

#[async_trait]
impl EventStore for FailingStore {
    async fn insert(&self, _record: PendingEvent) -> Result<(), StoreError> {
        Err(StoreError::Io {
            message: "read-only".into(),
        })
    }

    async fn list(&self) -> Result<Vec<PendingEvent>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _key: &EventKey) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory store that refuses writes for one trigger id.
struct PartiallyFailingStore {
    inner: InMemoryEventStore,
    broken_trigger: String,
}

#[async_trait]
impl EventStore for PartiallyFailingStore {
    async fn insert(&self, record: PendingEvent) -> Result<(), StoreError> {
        if record.trigger_id == self.broken_trigger {
            return Err(StoreError::Io {
                message: "disk full".into(),
            });
        }
        self.inner.insert(record).await
    }

    async fn list(&self) -> Result<Vec<PendingEvent>, StoreError> {
        self.inner.list().await
    }

    async fn delete(&self, key: &EventKey) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

fn slow_config() -> DeliveryConfig {
    // Long enough that the background cycle never ticks during a test.
    DeliveryConfig {
        retransmit_interval: Duration::from_secs(60),
        max_age: Duration::from_secs(600),
    }
}

fn event(id: &str) -> TriggerEvent {
    let mut outputs = shared_types::ValueMap::new();
    outputs.insert("seq".into(), json!(id));
    TriggerEvent {
        trigger_type: "test-trigger@1.0.0".into(),
        id: id.into(),
        outputs,
    }
}

fn stored_record(event_id: &str, first_at: DateTime<Utc>) -> PendingEvent {
    let (any_type_url, payload) = JsonEventCodec.encode(&event(event_id)).unwrap();
    PendingEvent {
        trigger_id: TRIGGER.into(),
        workflow_id: WORKFLOW.into(),
        event_id: event_id.into(),
        any_type_url,
        payload,
        first_at,
        last_sent_at: None,
        attempts: 0,
    }
}

struct Fixture {
    engine: ReliableDeliveryEngine,
    store: Arc<InMemoryEventStore>,
    clock: Arc<ManualTimeSource>,
    sink: Arc<RecordingSink>,
    lost: Arc<AtomicUsize>,
}

fn fixture(config: DeliveryConfig) -> Fixture {
    let store = Arc::new(InMemoryEventStore::new());
    let clock = Arc::new(ManualTimeSource::default());
    let lost = Arc::new(AtomicUsize::new(0));
    let lost_counter = lost.clone();
    let engine = ReliableDeliveryEngine::builder(store.clone())
        .name("test-trigger@1.0.0")
        .config(config)
        .time_source(clock.clone())
        .lost_hook(Arc::new(move |_: &PendingEvent| {
            lost_counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();
    Fixture {
        engine,
        store,
        clock,
        sink: Arc::new(RecordingSink::default()),
        lost,
    }
}

#[tokio::test]
async fn test_deliver_persists_then_sends() {
    let f = fixture(slow_config());
    f.engine.register(TRIGGER, WORKFLOW, f.sink.clone()).await;

    f.engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap();

    assert_eq!(f.sink.ids(), vec!["e1"]);
    let stored = f.store.get(&EventKey::new(TRIGGER, WORKFLOW, "e1")).unwrap();
    assert_eq!(stored.attempts, 1);
    assert!(stored.last_sent_at.is_some());
}

#[tokio::test]
async fn test_deliver_without_subscriber_stays_pending() {
    let f = fixture(slow_config());
    f.engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap();

    assert_eq!(f.engine.pending_count(), 1);
    assert_eq!(f.store.len(), 1);

    // Subscribing flushes the backlog.
    f.engine.register(TRIGGER, WORKFLOW, f.sink.clone()).await;
    assert_eq!(f.sink.ids(), vec!["e1"]);
}

#[tokio::test]
async fn test_deliver_fans_out_per_workflow() {
    let f = fixture(slow_config());
    let other = Arc::new(RecordingSink::default());
    f.engine.register(TRIGGER, "wf-a", f.sink.clone()).await;
    f.engine.register(TRIGGER, "wf-b", other.clone()).await;

    f.engine
        .deliver_event(TRIGGER, event("e1"), &["wf-a".to_string(), "wf-b".to_string()])
        .await
        .unwrap();

    assert_eq!(f.sink.count(), 1);
    assert_eq!(other.count(), 1);
    assert_eq!(f.engine.pending_count(), 2);
}

#[tokio::test]
async fn test_store_failure_is_returned() {
    let engine = ReliableDeliveryEngine::builder(Arc::new(FailingStore))
        .config(slow_config())
        .build()
        .unwrap();
    let sink = Arc::new(RecordingSink::default());
    engine.register(TRIGGER, WORKFLOW, sink.clone()).await;

    let err = engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Store(_)));
    // Nothing is sent before it is persisted.
    assert_eq!(sink.count(), 0);
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn test_send_failure_is_swallowed() {
    let f = fixture(slow_config());
    f.sink.failing.store(true, Ordering::SeqCst);
    f.engine.register(TRIGGER, WORKFLOW, f.sink.clone()).await;

    assert!(f
        .engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .is_ok());
    assert_eq!(f.engine.pending_events()[0].attempts, 1);
}

#[tokio::test]
async fn test_ack_is_idempotent() {
    let f = fixture(slow_config());
    f.engine.register(TRIGGER, WORKFLOW, f.sink.clone()).await;
    f.engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap();

    f.engine.ack_event(TRIGGER, WORKFLOW, "e1").await.unwrap();
    f.engine.ack_event(TRIGGER, WORKFLOW, "e1").await.unwrap();
    f.engine.ack_event(TRIGGER, WORKFLOW, "never-sent").await.unwrap();

    assert_eq!(f.engine.pending_count(), 0);
    assert!(f.store.is_empty());

    f.clock.advance(Duration::from_secs(120));
    f.engine.retransmit_pending().await;
    assert_eq!(f.sink.count(), 1);
}

#[tokio::test]
async fn test_retransmit_respects_interval() {
    let f = fixture(slow_config());
    f.engine.register(TRIGGER, WORKFLOW, f.sink.clone()).await;
    f.engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap();

    f.clock.advance(Duration::from_secs(59));
    f.engine.retransmit_pending().await;
    assert_eq!(f.sink.count(), 1);

    f.clock.advance(Duration::from_secs(1));
    f.engine.retransmit_pending().await;
    assert_eq!(f.sink.count(), 2);

    let record = f.store.get(&EventKey::new(TRIGGER, WORKFLOW, "e1")).unwrap();
    assert_eq!(record.attempts, 2);
}

#[tokio::test]
async fn test_redelivery_keeps_first_at() {
    let f = fixture(slow_config());
    f.engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap();
    let first = f.engine.pending_events()[0].first_at;

    f.clock.advance(Duration::from_secs(30));
    f.engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap();

    assert_eq!(f.engine.pending_events()[0].first_at, first);
    let stored = f.store.get(&EventKey::new(TRIGGER, WORKFLOW, "e1")).unwrap();
    assert_eq!(stored.first_at, first);
}

#[tokio::test]
async fn test_start_sends_recovered_events_before_first_tick() {
    let f = fixture(slow_config());
    let now = f.clock.now();
    f.store
        .insert(stored_record("old", now - chrono::Duration::seconds(300)))
        .await
        .unwrap();
    f.store
        .insert(stored_record("newer", now - chrono::Duration::seconds(10)))
        .await
        .unwrap();
    f.engine.register(TRIGGER, WORKFLOW, f.sink.clone()).await;

    f.engine.start().await.unwrap();

    // Oldest first, one attempt each, no tick needed.
    assert_eq!(f.sink.ids(), vec!["old", "newer"]);
    assert_eq!(f.engine.pending_count(), 2);
    f.engine.close().await;
}

#[tokio::test]
async fn test_start_twice_fails() {
    let f = fixture(slow_config());
    f.engine.start().await.unwrap();
    assert_eq!(f.engine.start().await, Err(DeliveryError::AlreadyStarted));
    f.engine.close().await;
}

#[tokio::test]
async fn test_lost_event_reported_once() {
    let f = fixture(slow_config());
    let now = f.clock.now();
    f.store
        .insert(stored_record("ancient", now - chrono::Duration::seconds(600)))
        .await
        .unwrap();

    // No subscriber yet: start loads the record but cannot send it.
    f.engine.start().await.unwrap();
    f.engine.register(TRIGGER, WORKFLOW, f.sink.clone()).await;
    let sent_before = f.sink.count();

    f.engine.retransmit_pending().await;
    f.engine.retransmit_pending().await;
    f.clock.advance(Duration::from_secs(120));
    f.engine.retransmit_pending().await;

    assert_eq!(f.lost.load(Ordering::SeqCst), 1);
    assert_eq!(f.engine.pending_count(), 0);
    assert!(f.store.is_empty());
    assert_eq!(f.sink.count(), sent_before);
    f.engine.close().await;
}

#[tokio::test]
async fn test_background_cycle_retransmits() {
    let store = Arc::new(InMemoryEventStore::new());
    let engine = ReliableDeliveryEngine::builder(store.clone())
        .config(DeliveryConfig::for_testing())
        .build()
        .unwrap();
    let sink = Arc::new(RecordingSink::default());
    engine.register(TRIGGER, WORKFLOW, sink.clone()).await;
    engine.start().await.unwrap();

    engine
        .deliver_event(TRIGGER, event("e1"), &[WORKFLOW.to_string()])
        .await
        .unwrap();

    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while sink.count() < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "expected retransmissions");

    engine.ack_event(TRIGGER, WORKFLOW, "e1").await.unwrap();
    engine.close().await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_close_stops_loop() {
    let f = fixture(DeliveryConfig::for_testing());
    f.engine.start().await.unwrap();
    let token = f.engine.shutdown_token();

    tokio::time::timeout(Duration::from_secs(1), f.engine.close())
        .await
        .unwrap();
    assert!(token.is_cancelled());
}

// =============================================================================
// BaseTriggerCapability
// =============================================================================

fn trigger_info() -> CapabilityInfo {
    CapabilityInfo::new("test-trigger@1.0.0", CapabilityType::Trigger, "test").unwrap()
}

fn registration(trigger_id: &str, workflow_id: &str) -> TriggerRegistrationRequest {
    TriggerRegistrationRequest {
        trigger_id: trigger_id.into(),
        metadata: RequestMetadata {
            workflow_id: workflow_id.into(),
            ..Default::default()
        },
        config: Default::default(),
    }
}

fn base_trigger() -> BaseTriggerCapability {
    let engine = ReliableDeliveryEngine::builder(Arc::new(InMemoryEventStore::new()))
        .config(slow_config())
        .build()
        .unwrap();
    BaseTriggerCapability::new(trigger_info(), Arc::new(engine)).unwrap()
}

#[test]
fn test_base_trigger_rejects_non_trigger_info() {
    let engine = ReliableDeliveryEngine::builder(Arc::new(InMemoryEventStore::new()))
        .build()
        .unwrap();
    let info = CapabilityInfo::new("act@1.0.0", CapabilityType::Action, "").unwrap();
    let err = BaseTriggerCapability::new(info, Arc::new(engine)).err().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn test_base_trigger_fire_and_ack() {
    let trigger = base_trigger();
    let mut rx_a = trigger.register_trigger(registration("t-a", "wf-a")).await.unwrap();
    let mut rx_b = trigger.register_trigger(registration("t-b", "wf-b")).await.unwrap();

    assert_eq!(trigger.fire(event("e1")).await.unwrap(), 2);
    assert_eq!(rx_a.recv().await.unwrap().event().unwrap().id, "e1");
    assert_eq!(rx_b.recv().await.unwrap().event().unwrap().id, "e1");
    assert_eq!(trigger.engine().pending_count(), 2);

    trigger
        .ack_event(AckEventRequest {
            trigger_id: "t-a".into(),
            workflow_id: "wf-a".into(),
            event_id: "e1".into(),
        })
        .await
        .unwrap();
    assert_eq!(trigger.engine().pending_count(), 1);
}

#[tokio::test]
async fn test_base_trigger_duplicate_registration() {
    let trigger = base_trigger();
    let _rx = trigger.register_trigger(registration("t-a", "wf-a")).await.unwrap();
    let err = trigger
        .register_trigger(registration("t-a", "wf-a"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyExists);
}

#[tokio::test]
async fn test_base_trigger_unregister_closes_channel() {
    let trigger = base_trigger();
    let mut rx = trigger.register_trigger(registration("t-a", "wf-a")).await.unwrap();
    trigger.fire(event("e1")).await.unwrap();

    trigger
        .unregister_trigger(registration("t-a", "wf-a"))
        .await
        .unwrap();
    assert_eq!(trigger.registration_count(), 0);

    // Already-queued events drain, then the channel reports closed.
    assert!(rx.recv().await.is_some());
    let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert_eq!(closed.unwrap(), None);
}

#[tokio::test]
async fn test_base_trigger_fire_to_unknown() {
    let trigger = base_trigger();
    let err = trigger.fire_to("missing", event("e1")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_base_trigger_fire_reaches_healthy_registrations_when_one_fails() {
    let store = Arc::new(PartiallyFailingStore {
        inner: InMemoryEventStore::new(),
        broken_trigger: "t-broken".into(),
    });
    let engine = ReliableDeliveryEngine::builder(store.clone())
        .config(slow_config())
        .build()
        .unwrap();
    let trigger = BaseTriggerCapability::new(trigger_info(), Arc::new(engine)).unwrap();

    let _rx_broken = trigger
        .register_trigger(registration("t-broken", "wf-a"))
        .await
        .unwrap();
    let mut rx_a = trigger.register_trigger(registration("t-a", "wf-a")).await.unwrap();
    let mut rx_b = trigger.register_trigger(registration("t-b", "wf-b")).await.unwrap();

    let err = trigger.fire(event("e1")).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Store(StoreError::Io { .. })));

    // Whatever order the registrations were visited in, both healthy ones
    // got the event persisted and delivered.
    assert_eq!(rx_a.recv().await.unwrap().event().unwrap().id, "e1");
    assert_eq!(rx_b.recv().await.unwrap().event().unwrap().id, "e1");
    let mut persisted: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.trigger_id)
        .collect();
    persisted.sort();
    assert_eq!(persisted, vec!["t-a".to_string(), "t-b".to_string()]);
    assert_eq!(trigger.engine().pending_count(), 2);
}
