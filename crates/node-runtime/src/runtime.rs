//! # Node Runtime
//!
//! ## Startup Sequence
//!
//! 1. Build components from the configuration
//! 2. Start the delivery engine (recovers pending events from the store)
//! 3. Publish the heartbeat trigger in the registry
//! 4. Bind the registry RPC listener
//! 5. Start the heartbeat ticker
//!
//! ## Shutdown
//!
//! The runtime token stops the listener, its connections and the heartbeat.
//! Then the delivery engine is closed and the broker tears down every
//! capability endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use cm_01_reliable_delivery::ReliableDeliveryEngine;
use cm_02_rpc_bridge::{serve_connection, EndpointBroker, RpcService};
use cm_03_capability_registry::{CapabilityRegistry, RegistryService};
use cm_telemetry::PrometheusMetrics;
use parking_lot::Mutex;
use shared_types::Capability;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::container::{NodeComponents, NodeConfig};
use crate::RuntimeError;

/// The running node.
pub struct NodeRuntime {
    components: NodeComponents,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    registry_addr: Mutex<Option<SocketAddr>>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig) -> Result<Self, RuntimeError> {
        Ok(Self::from_components(NodeComponents::new(config)?))
    }

    pub fn from_components(components: NodeComponents) -> Self {
        Self {
            components,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            registry_addr: Mutex::new(None),
        }
    }

    /// Start every component. Returns the address the registry RPC
    /// service is listening on.
    pub async fn start(&self) -> Result<SocketAddr, RuntimeError> {
        if self.registry_addr.lock().is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }
        let components = &self.components;

        components.engine.start().await?;

        if let Some(heartbeat) = &components.heartbeat {
            components
                .registry
                .add(Capability::trigger(heartbeat.capability()))
                .await?;
        }

        let requested = components.config.registry.listen_addr;
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|source| RuntimeError::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| RuntimeError::Bind {
            addr: requested,
            source,
        })?;
        let service: Arc<dyn RpcService> =
            Arc::new(RegistryService::new(components.registry.clone()));

        {
            let mut tasks = self.tasks.lock();
            tasks.push(tokio::spawn(accept_loop(
                listener,
                service,
                self.shutdown.child_token(),
            )));
            if let Some(heartbeat) = &components.heartbeat {
                tasks.push(heartbeat.clone().spawn(self.shutdown.child_token()));
            }
        }

        *self.registry_addr.lock() = Some(addr);
        info!(
            %addr,
            capabilities = components.registry.len(),
            "[Runtime] Node started"
        );
        Ok(addr)
    }

    /// Stop every task, close the engine and the broker.
    pub async fn shutdown(&self) {
        info!("[Runtime] Initiating graceful shutdown...");
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "[Runtime] Task ended abnormally");
            }
        }

        self.components.engine.close().await;
        self.components.broker.shutdown();
        info!("[Runtime] Shutdown complete");
    }

    /// Address of the registry RPC listener once started.
    pub fn registry_addr(&self) -> Option<SocketAddr> {
        *self.registry_addr.lock()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.components.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.components.registry
    }

    pub fn broker(&self) -> &Arc<EndpointBroker> {
        &self.components.broker
    }

    pub fn engine(&self) -> &Arc<ReliableDeliveryEngine> {
        &self.components.engine
    }

    pub fn metrics(&self) -> &Arc<PrometheusMetrics> {
        &self.components.metrics
    }

    pub fn components(&self) -> &NodeComponents {
        &self.components
    }
}

async fn accept_loop(listener: TcpListener, service: Arc<dyn RpcService>, token: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "[Runtime] set TCP_NODELAY failed");
                }
                debug!(%peer, "[Runtime] Registry connection accepted");
                tokio::spawn(serve_connection(stream, service.clone(), token.clone()));
            }
            Err(e) => {
                warn!(error = %e, "[Runtime] Registry accept failed");
            }
        }
    }
    debug!("[Runtime] Registry listener stopped");
}
