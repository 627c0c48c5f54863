//! # Component Container
//!
//! Holds the node's long-lived components and builds them from
//! [`NodeConfig`] in dependency order:
//!
//! ```text
//! 1. Metrics sink (Prometheus, node-local registry)
//! 2. Event store (memory or RocksDB) -> delivery engine
//! 3. Endpoint broker -> capability registry (topology, server options)
//! 4. Heartbeat trigger on top of the delivery engine
//! ```
//!
//! Nothing here starts a task; see [`crate::NodeRuntime::start`].

use std::sync::Arc;

use cm_01_reliable_delivery::{EventStore, InMemoryEventStore, ReliableDeliveryEngine};
use cm_02_rpc_bridge::EndpointBroker;
use cm_03_capability_registry::CapabilityRegistry;
use cm_telemetry::PrometheusMetrics;
use shared_types::MetricsSink;
use tracing::{info, instrument};

use crate::adapters::heartbeat::{HeartbeatTrigger, HEARTBEAT_CAPABILITY_ID};
use crate::container::config::{NodeConfig, StoreBackend};
use crate::RuntimeError;

pub struct NodeComponents {
    pub metrics: Arc<PrometheusMetrics>,
    pub store: Arc<dyn EventStore>,
    /// Delivery engine shared by the node's built-in triggers.
    pub engine: Arc<ReliableDeliveryEngine>,
    pub broker: Arc<EndpointBroker>,
    pub registry: Arc<CapabilityRegistry>,
    pub heartbeat: Option<Arc<HeartbeatTrigger>>,
    pub config: NodeConfig,
}

impl NodeComponents {
    #[instrument(name = "components_init", skip(config))]
    pub fn new(config: NodeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let metrics = PrometheusMetrics::shared();
        let sink: Arc<dyn MetricsSink> = metrics.clone();

        let store = open_store(&config)?;
        let engine = Arc::new(
            ReliableDeliveryEngine::builder(store.clone())
                .name(HEARTBEAT_CAPABILITY_ID)
                .config(config.delivery.delivery_config())
                .metrics(sink.clone())
                .build()?,
        );
        info!(
            store = ?config.delivery.store,
            retransmit_ms = config.delivery.retransmit_interval_ms,
            "[Runtime] Delivery engine ready"
        );

        let broker = Arc::new(EndpointBroker::new(config.registry.broker_config()));
        let registry = Arc::new(
            CapabilityRegistry::new(broker.clone())
                .with_server_options(config.registry.server_options())
                .with_metrics(sink),
        );
        registry.set_local_node(config.node.local_node());
        registry.set_dons(config.node.known_dons.clone());
        info!(
            transport = ?config.registry.broker_transport,
            workflow_don = config.node.workflow_don.id,
            capability_dons = config.node.capability_dons.len(),
            "[Runtime] Capability registry ready"
        );

        let heartbeat = if config.heartbeat.enabled {
            Some(Arc::new(HeartbeatTrigger::new(
                engine.clone(),
                config.heartbeat.interval(),
            )?))
        } else {
            None
        };

        Ok(Self {
            metrics,
            store,
            engine,
            broker,
            registry,
            heartbeat,
            config,
        })
    }
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn EventStore>, RuntimeError> {
    match config.delivery.store {
        StoreBackend::Memory => Ok(Arc::new(InMemoryEventStore::new())),
        #[cfg(feature = "rocksdb")]
        StoreBackend::Rocksdb => {
            use cm_01_reliable_delivery::{RocksDbEventStore, RocksDbEventStoreConfig};
            let store = RocksDbEventStore::open(RocksDbEventStoreConfig {
                path: config.delivery.store_path.to_string_lossy().to_string(),
                ..Default::default()
            })?;
            info!(path = %config.delivery.store_path.display(), "[Runtime] Opened RocksDB event store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "rocksdb"))]
        StoreBackend::Rocksdb => Err(RuntimeError::Config(
            crate::container::config::ConfigError::Invalid(
                "delivery.store = \"rocksdb\" requires the rocksdb feature".into(),
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_from_defaults() {
        let components = NodeComponents::new(NodeConfig::default()).unwrap();
        assert!(components.heartbeat.is_some());
        assert!(components.registry.is_empty());
        assert_eq!(components.registry.local_node(), components.config.node.local_node());
    }

    #[test]
    fn test_heartbeat_can_be_disabled() {
        let mut config = NodeConfig::default();
        config.heartbeat.enabled = false;
        let components = NodeComponents::new(config).unwrap();
        assert!(components.heartbeat.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = NodeConfig::default();
        config.delivery.retransmit_interval_ms = 0;
        assert!(matches!(
            NodeComponents::new(config),
            Err(RuntimeError::Config(_))
        ));
    }
}
