//! Prometheus-backed [`MetricsSink`].
//!
//! Metric families are created on first use with the label names of that
//! first sample, and registered on a registry owned by the sink rather
//! than a process-wide one. A later sample with different label names is
//! dropped with a warning.

use crate::TelemetryError;
use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use shared_types::metrics::{names, Labels};
use shared_types::MetricsSink;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Help text of a known metric.
fn help(name: &str) -> &'static str {
    match name {
        names::TRIGGER_EVENTS_PERSISTED => "Trigger events written ahead to the event store",
        names::TRIGGER_EVENTS_SENT => "Trigger event delivery attempts",
        names::TRIGGER_SEND_FAILURES => "Trigger event delivery attempts that failed",
        names::TRIGGER_EVENTS_ACKED => "Trigger events acknowledged by subscribers",
        names::TRIGGER_EVENTS_LOST => "Trigger events given up on after the maximum age",
        names::TRIGGER_PENDING => "Trigger events awaiting acknowledgement",
        names::RPC_CALLS => "Capability RPC calls served",
        names::RPC_CALL_FAILURES => "Capability RPC calls that returned an error",
        names::RPC_CALL_DURATION => "Capability RPC call duration in seconds",
        names::REGISTRY_CAPABILITIES => "Capabilities currently registered",
        _ => "capability mesh metric",
    }
}

pub struct PrometheusMetrics {
    registry: Registry,
    counters: Mutex<HashMap<&'static str, CounterVec>>,
    gauges: Mutex<HashMap<&'static str, GaugeVec>>,
    histograms: Mutex<HashMap<&'static str, HistogramVec>>,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered family.
    pub fn render(&self) -> Result<String, TelemetryError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }

    fn register<C: Collector + Clone + 'static>(&self, name: &str, collector: C) -> Option<C> {
        match self.registry.register(Box::new(collector.clone())) {
            Ok(()) => Some(collector),
            Err(e) => {
                warn!(metric = name, error = %e, "[Telemetry] Metric registration failed");
                None
            }
        }
    }

    fn counter(&self, name: &'static str, label_names: &[&str]) -> Option<CounterVec> {
        let mut counters = self.counters.lock();
        if let Some(existing) = counters.get(name) {
            return Some(existing.clone());
        }
        let vec = CounterVec::new(Opts::new(name, help(name)), label_names).ok()?;
        let vec = self.register(name, vec)?;
        counters.insert(name, vec.clone());
        Some(vec)
    }

    fn gauge(&self, name: &'static str, label_names: &[&str]) -> Option<GaugeVec> {
        let mut gauges = self.gauges.lock();
        if let Some(existing) = gauges.get(name) {
            return Some(existing.clone());
        }
        let vec = GaugeVec::new(Opts::new(name, help(name)), label_names).ok()?;
        let vec = self.register(name, vec)?;
        gauges.insert(name, vec.clone());
        Some(vec)
    }

    fn histogram(&self, name: &'static str, label_names: &[&str]) -> Option<HistogramVec> {
        let mut histograms = self.histograms.lock();
        if let Some(existing) = histograms.get(name) {
            return Some(existing.clone());
        }
        let buckets = exponential_buckets(0.0005, 2.0, 16).ok()?;
        let opts = HistogramOpts::new(name, help(name)).buckets(buckets);
        let vec = HistogramVec::new(opts, label_names).ok()?;
        let vec = self.register(name, vec)?;
        histograms.insert(name, vec.clone());
        Some(vec)
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn split(labels: Labels<'_>) -> (Vec<&'static str>, Vec<&str>) {
    labels.iter().map(|(key, value)| (*key, *value)).unzip()
}

fn mismatch(name: &str, error: prometheus::Error) {
    warn!(metric = name, error = %error, "[Telemetry] Sample dropped");
}

impl MetricsSink for PrometheusMetrics {
    fn increment(&self, name: &'static str, labels: Labels<'_>) {
        let (keys, values) = split(labels);
        if let Some(vec) = self.counter(name, &keys) {
            match vec.get_metric_with_label_values(&values) {
                Ok(counter) => counter.inc(),
                Err(e) => mismatch(name, e),
            }
        }
    }

    fn set_gauge(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        let (keys, values) = split(labels);
        if let Some(vec) = self.gauge(name, &keys) {
            match vec.get_metric_with_label_values(&values) {
                Ok(gauge) => gauge.set(value),
                Err(e) => mismatch(name, e),
            }
        }
    }

    fn observe(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        let (keys, values) = split(labels);
        if let Some(vec) = self.histogram(name, &keys) {
            match vec.get_metric_with_label_values(&values) {
                Ok(histogram) => histogram.observe(value),
                Err(e) => mismatch(name, e),
            }
        }
    }
}
