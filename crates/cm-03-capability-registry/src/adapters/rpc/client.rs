use crate::adapters::rpc::wire::{
    ConfigRequest, EndpointEntry, IdRequest, NodeReply, PeerRequest, METHOD_ADD,
    METHOD_CONFIG_FOR_CAPABILITY, METHOD_GET, METHOD_GET_EXECUTABLE, METHOD_GET_TRIGGER,
    METHOD_LIST, METHOD_LOCAL_NODE, METHOD_NODE_BY_PEER_ID, METHOD_REMOVE,
};
use crate::domain::config::CapabilityConfiguration;
use crate::ports::{CapabilityRegistryApi, RegisteredCapability};
use async_trait::async_trait;
use cm_02_rpc_bridge::{
    CapabilityClient, CapabilityService, EndpointBroker, EndpointHandle, RpcClient, ServerOptions,
};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{
    validate_capability_id, Capability, CapabilityError, CapabilityInfo, ExecutableCapability,
    Node, PeerId, TriggerCapability,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reaches a remote registry.
///
/// `broker` dials the handles the registry returns and publishes the
/// capabilities added through this client.
pub struct RegistryClient {
    rpc: RpcClient,
    broker: Arc<EndpointBroker>,
    options: ServerOptions,
    /// Endpoints this client published, by capability id.
    published: DashMap<String, u64>,
}

impl RegistryClient {
    pub fn new(rpc: RpcClient, broker: Arc<EndpointBroker>) -> Self {
        Self {
            rpc,
            broker,
            options: ServerOptions::default(),
            published: DashMap::new(),
        }
    }

    /// Options for capabilities published through `add`.
    pub fn with_server_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn close(&self) {
        self.rpc.close();
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, CapabilityError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.rpc
            .unary(method, request)
            .await
            .map_err(CapabilityError::from)
    }

    async fn entry(&self, method: &str, id: &str) -> Result<EndpointEntry, CapabilityError> {
        self.call(method, &IdRequest { id: id.to_string() }).await
    }

    async fn dial(&self, handle: &EndpointHandle) -> Result<CapabilityClient, CapabilityError> {
        let rpc = self.broker.dial(handle).await?;
        Ok(CapabilityClient::new(rpc))
    }
}

#[async_trait]
impl CapabilityRegistryApi for RegistryClient {
    async fn add(&self, capability: Capability) -> Result<CapabilityInfo, CapabilityError> {
        let info = capability.info().await?;
        validate_capability_id(&info.id)?;
        capability.check_info(&info)?;

        let service = CapabilityService::new(capability, self.options);
        let handle = self.broker.serve(Arc::new(service)).await?;
        let entry = EndpointEntry {
            info: info.clone(),
            handle,
        };
        if let Err(err) = self.call::<_, ()>(METHOD_ADD, &entry).await {
            self.broker.close(handle.id);
            return Err(err);
        }
        if let Some(stale) = self.published.insert(info.id.clone(), handle.id) {
            self.broker.close(stale);
        }
        info!(capability_id = %info.id, endpoint = %handle, "[Registry] Capability added remotely");
        Ok(info)
    }

    async fn get(&self, id: &str) -> Result<RegisteredCapability, CapabilityError> {
        let entry = self.entry(METHOD_GET, id).await?;
        let client = self.dial(&entry.handle).await?;
        RegisteredCapability::new(entry.info, client)
    }

    async fn get_trigger(&self, id: &str) -> Result<Arc<dyn TriggerCapability>, CapabilityError> {
        let entry = self.entry(METHOD_GET_TRIGGER, id).await?;
        Ok(Arc::new(self.dial(&entry.handle).await?))
    }

    async fn get_executable(
        &self,
        id: &str,
    ) -> Result<Arc<dyn ExecutableCapability>, CapabilityError> {
        let entry = self.entry(METHOD_GET_EXECUTABLE, id).await?;
        Ok(Arc::new(self.dial(&entry.handle).await?))
    }

    async fn list(&self) -> Result<Vec<RegisteredCapability>, CapabilityError> {
        let entries: Vec<EndpointEntry> = self.call(METHOD_LIST, &()).await?;
        let mut dialed: Vec<RegisteredCapability> = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.info.id.clone();
            let result = match self.dial(&entry.handle).await {
                Ok(client) => RegisteredCapability::new(entry.info, client),
                Err(err) => Err(err),
            };
            match result {
                Ok(capability) => dialed.push(capability),
                Err(err) => {
                    warn!(capability_id = %id, error = %err, "[Registry] List aborted, closing dialed handles");
                    for capability in &dialed {
                        capability.close();
                    }
                    return Err(err);
                }
            }
        }
        Ok(dialed)
    }

    async fn remove(&self, id: &str) -> Result<(), CapabilityError> {
        self.call::<_, ()>(METHOD_REMOVE, &IdRequest { id: id.to_string() })
            .await?;
        if let Some((_, endpoint)) = self.published.remove(id) {
            self.broker.close(endpoint);
            debug!(capability_id = %id, "[Registry] Closed locally published endpoint");
        }
        Ok(())
    }

    async fn config_for_capability(
        &self,
        id: &str,
        don_id: u32,
    ) -> Result<CapabilityConfiguration, CapabilityError> {
        self.call(
            METHOD_CONFIG_FOR_CAPABILITY,
            &ConfigRequest {
                id: id.to_string(),
                don_id,
            },
        )
        .await
    }

    async fn local_node(&self) -> Result<Node, CapabilityError> {
        let reply: NodeReply = self.call(METHOD_LOCAL_NODE, &()).await?;
        Node::try_from(reply.node)
    }

    async fn node_by_peer_id(&self, peer_id: PeerId) -> Result<Node, CapabilityError> {
        let request = PeerRequest {
            peer_id: peer_id.as_bytes().to_vec(),
        };
        let reply: NodeReply = self.call(METHOD_NODE_BY_PEER_ID, &request).await?;
        Node::try_from(reply.node)
    }
}
