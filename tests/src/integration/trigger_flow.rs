//! # Trigger Flow
//!
//! A workflow node subscribes to the heartbeat of a running node through
//! the node's registry RPC service:
//!
//! ```text
//! HeartbeatTrigger ─fire─► ReliableDeliveryEngine ─► CapabilityService (TCP)
//!                                                          │
//!            RegistryClient ─GetTrigger─► RegistryService  │
//!                  │                                       ▼
//!                  └──► CapabilityClient ─► subscriber channel ─AckEvent─┘
//! ```

#[cfg(test)]
mod tests {
    use crate::fixtures::{registration, registry_client, request_with, EchoAction};
    use cm_03_capability_registry::CapabilityRegistryApi;
    use node_runtime::{NodeConfig, NodeRuntime, HEARTBEAT_CAPABILITY_ID};
    use serde_json::json;
    use shared_types::{
        AckEventRequest, Capability, ErrorCode, TriggerEvent, TriggerResponse,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn node_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.registry.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.delivery.retransmit_interval_ms = 200;
        config.delivery.max_event_age_secs = 60;
        config.heartbeat.interval_ms = 30;
        config
    }

    async fn next_event(rx: &mut mpsc::Receiver<TriggerResponse>) -> TriggerEvent {
        let response = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("stream open");
        response.into_result().expect("event, not error")
    }

    // =========================================================================
    // TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_heartbeat_reaches_remote_subscriber_and_ack_clears_it() {
        let runtime = NodeRuntime::new(node_config()).unwrap();
        let addr = runtime.start().await.unwrap();

        let client = registry_client(addr).await;
        let trigger = client.get_trigger(HEARTBEAT_CAPABILITY_ID).await.unwrap();
        let mut rx = trigger
            .register_trigger(registration("hb-wf-1", "wf-1"))
            .await
            .unwrap();

        let first = next_event(&mut rx).await;
        let second = next_event(&mut rx).await;
        assert_eq!(first.trigger_type, HEARTBEAT_CAPABILITY_ID);
        assert_ne!(first.id, second.id);

        trigger
            .ack_event(AckEventRequest {
                trigger_id: "hb-wf-1".into(),
                workflow_id: "wf-1".into(),
                event_id: first.id.clone(),
            })
            .await
            .unwrap();
        // Acking twice is harmless.
        trigger
            .ack_event(AckEventRequest {
                trigger_id: "hb-wf-1".into(),
                workflow_id: "wf-1".into(),
                event_id: first.id.clone(),
            })
            .await
            .unwrap();

        let still_pending = runtime
            .engine()
            .pending_events()
            .into_iter()
            .any(|p| p.event_id == first.id);
        assert!(!still_pending);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_node_shutdown_ends_stream_with_one_unavailable_error() {
        let runtime = NodeRuntime::new(node_config()).unwrap();
        let addr = runtime.start().await.unwrap();

        let client = registry_client(addr).await;
        let trigger = client.get_trigger(HEARTBEAT_CAPABILITY_ID).await.unwrap();
        let mut rx = trigger
            .register_trigger(registration("hb-wf-2", "wf-2"))
            .await
            .unwrap();
        next_event(&mut rx).await;

        runtime.shutdown().await;

        let mut errors = Vec::new();
        timeout(Duration::from_secs(5), async {
            while let Some(response) = rx.recv().await {
                if let TriggerResponse::Error(err) = response {
                    errors.push(err);
                }
            }
        })
        .await
        .expect("stream closes after shutdown");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn test_unregister_stops_the_stream_cleanly() {
        let runtime = NodeRuntime::new(node_config()).unwrap();
        let addr = runtime.start().await.unwrap();

        let client = registry_client(addr).await;
        let trigger = client.get_trigger(HEARTBEAT_CAPABILITY_ID).await.unwrap();
        let request = registration("hb-wf-3", "wf-3");
        let mut rx = trigger.register_trigger(request.clone()).await.unwrap();
        next_event(&mut rx).await;

        trigger.unregister_trigger(request).await.unwrap();

        let drained = timeout(Duration::from_secs(5), async {
            let mut errors = 0;
            while let Some(response) = rx.recv().await {
                if response.error().is_some() {
                    errors += 1;
                }
            }
            errors
        })
        .await
        .expect("stream closes after unregister");
        assert_eq!(drained, 0);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_capability_added_by_peer_is_callable_through_node() {
        let runtime = NodeRuntime::new(node_config()).unwrap();
        let addr = runtime.start().await.unwrap();

        // The peer publishes on its own broker; the node only records the handle.
        let peer = registry_client(addr).await;
        peer.add(Capability::executable(EchoAction::new("echo-action@1.0.0")))
            .await
            .unwrap();
        assert!(!runtime.registry().entry("echo-action@1.0.0").unwrap().owned);

        let other = registry_client(addr).await;
        let echo = other.get_executable("echo-action@1.0.0").await.unwrap();
        let response = echo.execute(request_with("x", json!(42))).await.unwrap();
        assert_eq!(response.value.get("x"), Some(&json!(42)));

        let ids: Vec<String> = other
            .list()
            .await
            .unwrap()
            .iter()
            .map(|c| c.info().id.clone())
            .collect();
        assert_eq!(ids, ["echo-action@1.0.0", HEARTBEAT_CAPABILITY_ID]);

        peer.remove("echo-action@1.0.0").await.unwrap();
        assert!(other.get("echo-action@1.0.0").await.is_err());

        runtime.shutdown().await;
    }
}
