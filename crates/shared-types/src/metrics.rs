//! Metrics sink port.
//!
//! Components receive an `Arc<dyn MetricsSink>` instead of touching a
//! process-wide registry; `cm-telemetry` provides the Prometheus adapter.

use std::sync::Arc;

/// Label pairs attached to a sample.
pub type Labels<'a> = &'a [(&'static str, &'a str)];

/// Metric names emitted by the capability layer.
pub mod names {
    pub const TRIGGER_EVENTS_PERSISTED: &str = "cm_delivery_events_persisted_total";
    pub const TRIGGER_EVENTS_SENT: &str = "cm_delivery_send_attempts_total";
    pub const TRIGGER_SEND_FAILURES: &str = "cm_delivery_send_failures_total";
    pub const TRIGGER_EVENTS_ACKED: &str = "cm_delivery_events_acked_total";
    pub const TRIGGER_EVENTS_LOST: &str = "cm_delivery_events_lost_total";
    pub const TRIGGER_PENDING: &str = "cm_delivery_events_pending";
    pub const RPC_CALLS: &str = "cm_bridge_calls_total";
    pub const RPC_CALL_FAILURES: &str = "cm_bridge_call_failures_total";
    pub const RPC_CALL_DURATION: &str = "cm_bridge_call_duration_seconds";
    pub const REGISTRY_CAPABILITIES: &str = "cm_registry_capabilities";
}

/// Receives counters, gauges and observations.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str, labels: Labels<'_>);

    fn set_gauge(&self, name: &'static str, labels: Labels<'_>, value: f64);

    fn observe(&self, name: &'static str, labels: Labels<'_>, value: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn shared() -> Arc<dyn MetricsSink> {
        Arc::new(Self)
    }
}

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &'static str, _labels: Labels<'_>) {}

    fn set_gauge(&self, _name: &'static str, _labels: Labels<'_>, _value: f64) {}

    fn observe(&self, _name: &'static str, _labels: Labels<'_>, _value: f64) {}
}
