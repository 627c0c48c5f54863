//! # Restart Recovery
//!
//! An event fired but never acknowledged stays in the event store. A fresh
//! engine over the same store resends it once the subscriber registers
//! again, this time across the RPC bridge.

#[cfg(test)]
mod tests {
    use crate::fixtures::{fast_engine, registration};
    use cm_01_reliable_delivery::{BaseTriggerCapability, EventStore, InMemoryEventStore};
    use cm_02_rpc_bridge::{BrokerConfig, EndpointBroker};
    use cm_03_capability_registry::CapabilityRegistry;
    use serde_json::json;
    use shared_types::{
        AckEventRequest, Capability, CapabilityInfo, CapabilityType, TriggerCapability,
        TriggerEvent,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const TRIGGER: &str = "price-feed-trigger@1.0.0";

    fn trigger(store: Arc<dyn EventStore>) -> Arc<BaseTriggerCapability> {
        let info = CapabilityInfo::new(TRIGGER, CapabilityType::Trigger, "price feed").unwrap();
        Arc::new(BaseTriggerCapability::new(info, fast_engine(TRIGGER, store)).unwrap())
    }

    fn event(id: &str) -> TriggerEvent {
        let mut event = TriggerEvent {
            trigger_type: TRIGGER.to_string(),
            id: id.to_string(),
            ..Default::default()
        };
        event.outputs.insert("price".into(), json!(1234));
        event
    }

    /// First life: fire one event, drop the subscriber without acking.
    async fn fire_without_ack(store: Arc<dyn EventStore>) {
        let first = trigger(store.clone());
        first.engine().start().await.unwrap();
        let rx = first
            .register_trigger(registration("feed-1", "wf-1"))
            .await
            .unwrap();
        assert_eq!(first.fire(event("evt-1")).await.unwrap(), 1);
        drop(rx);
        first.engine().close().await;
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    /// Second life: publish the trigger on a bridge and resubscribe remotely.
    async fn resubscribe_and_ack(store: Arc<dyn EventStore>) {
        let second = trigger(store.clone());
        second.engine().start().await.unwrap();

        let broker = Arc::new(EndpointBroker::new(BrokerConfig::tcp()));
        let registry = CapabilityRegistry::new(broker.clone());
        registry
            .add(Capability::trigger(second.clone()))
            .await
            .unwrap();
        let remote = registry.get_trigger(TRIGGER).await.unwrap();

        let mut rx = remote
            .register_trigger(registration("feed-1", "wf-1"))
            .await
            .unwrap();
        let recovered = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(recovered.id, "evt-1");
        assert_eq!(recovered.outputs.get("price"), Some(&json!(1234)));

        remote
            .ack_event(AckEventRequest {
                trigger_id: "feed-1".into(),
                workflow_id: "wf-1".into(),
                event_id: "evt-1".into(),
            })
            .await
            .unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(second.engine().pending_count(), 0);

        second.engine().close().await;
        broker.shutdown();
    }

    #[tokio::test]
    async fn test_memory_store_recovers_across_engine_restart() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        fire_without_ack(store.clone()).await;
        resubscribe_and_ack(store).await;
    }

    #[cfg(feature = "rocksdb")]
    #[tokio::test]
    async fn test_rocksdb_store_recovers_across_reopen() {
        use cm_01_reliable_delivery::{RocksDbEventStore, RocksDbEventStoreConfig};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events").to_string_lossy().to_string();
        let open = || -> Arc<dyn EventStore> {
            Arc::new(RocksDbEventStore::open(RocksDbEventStoreConfig::for_testing(path.clone())).unwrap())
        };

        fire_without_ack(open()).await;
        // The first store is dropped with its engine, releasing the lock.
        resubscribe_and_ack(open()).await;
    }
}
