//! # Capability Mesh Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Error taxonomy | serialize / parse the wire string |
//! | RPC bridge | Execute round trip over in-process and TCP endpoints |
//! | Reliable delivery | persist, send and ack one event |

use cm_01_reliable_delivery::{BaseTriggerCapability, InMemoryEventStore};
use cm_02_rpc_bridge::{BrokerConfig, EndpointBroker};
use cm_03_capability_registry::CapabilityRegistry;
use cm_tests::fixtures::{fast_engine, registration, request_with, EchoAction};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use shared_types::{
    AckEventRequest, Capability, CapabilityError, CapabilityInfo, CapabilityType, ErrorCode,
    TriggerCapability, TriggerEvent,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

// ============================================================================
// Error taxonomy
// ============================================================================

fn bench_error_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("error-taxonomy");
    let err = CapabilityError::private_user(
        ErrorCode::InvalidArgument,
        "schema mismatch: field 'amount' at path a:b:c",
    );
    let wire = err.serialize_to_string();

    group.bench_function("serialize", |b| b.iter(|| black_box(err.serialize_to_string())));
    group.bench_function("serialize_remote", |b| {
        b.iter(|| black_box(err.serialize_to_remote_string()))
    });
    group.bench_function("parse", |b| {
        b.iter(|| black_box(CapabilityError::from_serialized(black_box(&wire))))
    });
    group.finish();
}

// ============================================================================
// RPC bridge
// ============================================================================

fn bench_execute_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("rpc-bridge");

    for (label, config) in [("in_process", BrokerConfig::default()), ("tcp", BrokerConfig::tcp())] {
        let action = rt.block_on(async {
            let registry = CapabilityRegistry::new(Arc::new(EndpointBroker::new(config)));
            registry
                .add(Capability::executable(EchoAction::new("echo-action@1.0.0")))
                .await
                .expect("add");
            let action = registry
                .get_executable("echo-action@1.0.0")
                .await
                .expect("dial");
            (registry, action)
        });

        group.bench_with_input(BenchmarkId::new("execute", label), &action, |b, (_, action)| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(action.execute(request_with("n", json!(1))).await.is_ok())
                })
            })
        });
    }
    group.finish();
}

// ============================================================================
// Reliable delivery
// ============================================================================

fn bench_deliver_and_ack(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("reliable-delivery");

    let (trigger, mut rx) = rt.block_on(async {
        let info = CapabilityInfo::new("bench-trigger@1.0.0", CapabilityType::Trigger, "bench")
            .expect("info");
        let engine = fast_engine("bench-trigger@1.0.0", Arc::new(InMemoryEventStore::new()));
        let trigger = Arc::new(BaseTriggerCapability::new(info, engine).expect("trigger"));
        let rx = trigger
            .register_trigger(registration("bench-1", "wf-1"))
            .await
            .expect("register");
        (trigger, rx)
    });

    let mut sequence = 0u64;
    group.bench_function("fire_receive_ack", |b| {
        b.iter(|| {
            sequence += 1;
            let id = format!("evt-{sequence}");
            rt.block_on(async {
                let event = TriggerEvent {
                    trigger_type: "bench-trigger@1.0.0".into(),
                    id: id.clone(),
                    ..Default::default()
                };
                trigger.fire(event).await.expect("fire");
                black_box(rx.recv().await);
                trigger
                    .ack_event(AckEventRequest {
                        trigger_id: "bench-1".into(),
                        workflow_id: "wf-1".into(),
                        event_id: id,
                    })
                    .await
                    .expect("ack");
            })
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_error_serialization,
    bench_execute_round_trip,
    bench_deliver_and_ack,
);

criterion_main!(benches);
