//! # Endpoint Broker
//!
//! Allocates endpoints for services on demand and dials them.
//!
//! - `InProcess`: each dial creates a fresh duplex pipe and serves the
//!   server half. Frames are still fully encoded, so behaviour matches a
//!   real socket. Handles are only dialable through the broker that
//!   created them.
//! - `Tcp`: each endpoint binds its own listener on an ephemeral port of
//!   `bind_host`. Handles are dialable from any process that can reach the
//!   address.
//!
//! Closing an endpoint stops its listener and every live connection.

use crate::errors::BrokerError;
use crate::transport::{serve_connection, RpcClient, RpcService};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Buffer size of in-process pipes.
const DUPLEX_BUFFER: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerTransport {
    #[default]
    InProcess,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    pub transport: BrokerTransport,
    /// Interface TCP endpoints bind to.
    pub bind_host: IpAddr,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            transport: BrokerTransport::InProcess,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl BrokerConfig {
    pub fn tcp() -> Self {
        Self {
            transport: BrokerTransport::Tcp,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EndpointAddress {
    InProcess,
    Tcp(SocketAddr),
}

/// Serialisable reference to a published endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointHandle {
    pub id: u64,
    pub address: EndpointAddress,
}

impl fmt::Display for EndpointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            EndpointAddress::InProcess => write!(f, "inproc#{}", self.id),
            EndpointAddress::Tcp(addr) => write!(f, "tcp://{}#{}", addr, self.id),
        }
    }
}

struct Endpoint {
    handle: EndpointHandle,
    service: Arc<dyn RpcService>,
    token: CancellationToken,
    connections: Arc<AtomicUsize>,
}

/// Decrements the endpoint's connection count when a connection ends.
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct EndpointBroker {
    config: BrokerConfig,
    next_id: AtomicU64,
    endpoints: DashMap<u64, Endpoint>,
    shutdown: CancellationToken,
}

impl EndpointBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            endpoints: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Publish `service` on a fresh endpoint.
    pub async fn serve(&self, service: Arc<dyn RpcService>) -> Result<EndpointHandle, BrokerError> {
        if self.shutdown.is_cancelled() {
            return Err(BrokerError::ShutDown);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        let connections = Arc::new(AtomicUsize::new(0));

        let address = match self.config.transport {
            BrokerTransport::InProcess => EndpointAddress::InProcess,
            BrokerTransport::Tcp => {
                let listener = TcpListener::bind(SocketAddr::new(self.config.bind_host, 0))
                    .await
                    .map_err(|e| BrokerError::Bind(e.to_string()))?;
                let local = listener
                    .local_addr()
                    .map_err(|e| BrokerError::Bind(e.to_string()))?;
                tokio::spawn(accept_loop(
                    id,
                    listener,
                    service.clone(),
                    token.clone(),
                    connections.clone(),
                ));
                EndpointAddress::Tcp(local)
            }
        };

        let handle = EndpointHandle { id, address };
        self.endpoints.insert(
            id,
            Endpoint {
                handle,
                service,
                token,
                connections,
            },
        );
        debug!(endpoint = %handle, "[Bridge] Endpoint published");
        Ok(handle)
    }

    /// Open a client connection to a published endpoint.
    pub async fn dial(&self, handle: &EndpointHandle) -> Result<RpcClient, BrokerError> {
        if self.shutdown.is_cancelled() {
            return Err(BrokerError::ShutDown);
        }
        match handle.address {
            EndpointAddress::InProcess => {
                let (service, token, connections) = {
                    let endpoint = self
                        .endpoints
                        .get(&handle.id)
                        .ok_or(BrokerError::NotFound(handle.id))?;
                    (
                        endpoint.service.clone(),
                        endpoint.token.clone(),
                        endpoint.connections.clone(),
                    )
                };
                let (client_io, server_io) = tokio::io::duplex(DUPLEX_BUFFER);
                let guard = ConnectionGuard::new(connections);
                tokio::spawn(async move {
                    let _guard = guard;
                    serve_connection(server_io, service, token).await;
                });
                Ok(RpcClient::connect(client_io))
            }
            EndpointAddress::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await.map_err(|e| BrokerError::Dial {
                    id: handle.id,
                    message: e.to_string(),
                })?;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "[Bridge] set TCP_NODELAY failed");
                }
                Ok(RpcClient::connect(stream))
            }
        }
    }

    /// Tear down an endpoint and all of its connections.
    ///
    /// Returns `false` if the id was unknown.
    pub fn close(&self, id: u64) -> bool {
        match self.endpoints.remove(&id) {
            Some((_, endpoint)) => {
                endpoint.token.cancel();
                debug!(endpoint = %endpoint.handle, "[Bridge] Endpoint closed");
                true
            }
            None => false,
        }
    }

    /// Live server-side connections of an endpoint.
    pub fn active_connections(&self, id: u64) -> usize {
        self.endpoints
            .get(&id)
            .map(|endpoint| endpoint.connections.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Close every endpoint and refuse further work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.endpoints.clear();
        info!("[Bridge] Endpoint broker shut down");
    }
}

impl Drop for EndpointBroker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    id: u64,
    listener: TcpListener,
    service: Arc<dyn RpcService>,
    token: CancellationToken,
    connections: Arc<AtomicUsize>,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "[Bridge] set TCP_NODELAY failed");
                }
                debug!(endpoint = id, %peer, "[Bridge] Connection accepted");
                let guard = ConnectionGuard::new(connections.clone());
                let service = service.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    serve_connection(stream, service, token).await;
                });
            }
            Err(e) => {
                warn!(endpoint = id, error = %e, "[Bridge] Accept failed");
            }
        }
    }
    debug!(endpoint = id, "[Bridge] Listener stopped");
}
