use crate::adapters::rpc::wire::{
    ConfigRequest, EndpointEntry, IdRequest, NodeReply, PeerRequest, METHOD_ADD,
    METHOD_CONFIG_FOR_CAPABILITY, METHOD_GET, METHOD_GET_EXECUTABLE, METHOD_GET_TRIGGER,
    METHOD_LIST, METHOD_LOCAL_NODE, METHOD_NODE_BY_PEER_ID, METHOD_REMOVE,
};
use crate::service::{CapabilityRegistry, RegistryEntry};
use async_trait::async_trait;
use cm_02_rpc_bridge::{InboundCall, RpcService};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shared_types::{CapabilityError, ErrorCode, NodeWire, PeerId};
use std::sync::Arc;
use tracing::debug;

/// Serves a [`CapabilityRegistry`] to remote `RegistryClient`s.
pub struct RegistryService {
    registry: Arc<CapabilityRegistry>,
}

impl RegistryService {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    async fn dispatch(&self, call: &InboundCall) -> Result<(), CapabilityError> {
        let registry = &self.registry;
        match call.method.as_str() {
            METHOD_GET => {
                let request: IdRequest = decode(&call.payload)?;
                reply(call, &endpoint(registry.lookup(&request.id)?)).await
            }
            METHOD_GET_TRIGGER => {
                let request: IdRequest = decode(&call.payload)?;
                reply(call, &endpoint(registry.trigger_entry(&request.id)?)).await
            }
            METHOD_GET_EXECUTABLE => {
                let request: IdRequest = decode(&call.payload)?;
                reply(call, &endpoint(registry.executable_entry(&request.id)?)).await
            }
            METHOD_LIST => {
                let entries: Vec<EndpointEntry> =
                    registry.entries().into_iter().map(endpoint).collect();
                reply(call, &entries).await
            }
            METHOD_ADD => {
                let request: EndpointEntry = decode(&call.payload)?;
                registry.add_endpoint(request.info, request.handle)?;
                reply(call, &()).await
            }
            METHOD_REMOVE => {
                let request: IdRequest = decode(&call.payload)?;
                registry.remove(&request.id);
                reply(call, &()).await
            }
            METHOD_CONFIG_FOR_CAPABILITY => {
                let request: ConfigRequest = decode(&call.payload)?;
                let config = registry.config_for_capability(&request.id, request.don_id)?;
                reply(call, &config).await
            }
            METHOD_LOCAL_NODE => {
                let node = registry.local_node();
                reply(call, &NodeReply { node: NodeWire::from(&node) }).await
            }
            METHOD_NODE_BY_PEER_ID => {
                let request: PeerRequest = decode(&call.payload)?;
                let peer = PeerId::from_slice(&request.peer_id)?;
                let node = registry.node_by_peer_id(peer);
                reply(call, &NodeReply { node: NodeWire::from(&node) }).await
            }
            other => Err(CapabilityError::public_system(
                ErrorCode::Unimplemented,
                format!("unknown registry method {other}"),
            )),
        }
    }
}

#[async_trait]
impl RpcService for RegistryService {
    async fn call(&self, call: InboundCall) -> Result<(), CapabilityError> {
        let result = self.dispatch(&call).await;
        if let Err(err) = &result {
            debug!(method = %call.method, error = %err, "[Registry] RPC call failed");
        }
        result
    }
}

fn endpoint(entry: RegistryEntry) -> EndpointEntry {
    EndpointEntry {
        info: entry.info,
        handle: entry.handle,
    }
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, CapabilityError> {
    serde_json::from_value(payload.clone()).map_err(|e| {
        CapabilityError::public_user(
            ErrorCode::InvalidArgument,
            format!("malformed registry request: {e}"),
        )
    })
}

async fn reply<T: Serialize + ?Sized>(call: &InboundCall, item: &T) -> Result<(), CapabilityError> {
    call.responder.send(item).await.map_err(CapabilityError::from)
}
