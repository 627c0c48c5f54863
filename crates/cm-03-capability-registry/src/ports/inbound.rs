//! # Inbound Port - CapabilityRegistryApi
//!
//! Implemented by the in-process [`CapabilityRegistry`](crate::CapabilityRegistry)
//! and by the [`RegistryClient`](crate::RegistryClient) that reaches one over
//! RPC, so callers do not care where the registry lives.
//!
//! Every lookup dials a fresh connection. Dialed handles never share
//! connection state; drop or `close()` them when done.

use crate::domain::config::CapabilityConfiguration;
use async_trait::async_trait;
use cm_02_rpc_bridge::CapabilityClient;
use shared_types::{
    Capability, CapabilityError, CapabilityInfo, CapabilityType, ErrorCode, ExecutableCapability,
    Node, PeerId, TriggerCapability,
};
use std::sync::Arc;

#[async_trait]
pub trait CapabilityRegistryApi: Send + Sync {
    /// Publish `capability` on a fresh endpoint under the id its `info()`
    /// reports.
    async fn add(&self, capability: Capability) -> Result<CapabilityInfo, CapabilityError>;

    async fn get(&self, id: &str) -> Result<RegisteredCapability, CapabilityError>;

    /// Like `get`, but only for `trigger` and `combined` capabilities.
    async fn get_trigger(&self, id: &str) -> Result<Arc<dyn TriggerCapability>, CapabilityError>;

    /// Like `get`, but only for `action`, `consensus`, `target` and
    /// `combined` capabilities.
    async fn get_executable(
        &self,
        id: &str,
    ) -> Result<Arc<dyn ExecutableCapability>, CapabilityError>;

    /// One dialed handle per registered id, ordered by id. Fails as a
    /// whole if any dial fails.
    async fn list(&self) -> Result<Vec<RegisteredCapability>, CapabilityError>;

    /// Tear down the endpoint of `id`. Unknown ids are ignored.
    async fn remove(&self, id: &str) -> Result<(), CapabilityError>;

    async fn config_for_capability(
        &self,
        id: &str,
        don_id: u32,
    ) -> Result<CapabilityConfiguration, CapabilityError>;

    async fn local_node(&self) -> Result<Node, CapabilityError>;

    /// Topology of `peer_id`; zero-valued DONs when the peer is unknown.
    async fn node_by_peer_id(&self, peer_id: PeerId) -> Result<Node, CapabilityError>;
}

/// A dialed capability together with its description.
#[derive(Clone)]
pub struct RegisteredCapability {
    info: CapabilityInfo,
    client: CapabilityClient,
    capability: Capability,
}

impl RegisteredCapability {
    /// Wrap `client` in the shape matching `info.capability_type`.
    pub fn new(info: CapabilityInfo, client: CapabilityClient) -> Result<Self, CapabilityError> {
        let shared = Arc::new(client.clone());
        let capability = match info.capability_type {
            CapabilityType::Trigger => Capability::Trigger(shared),
            CapabilityType::Action | CapabilityType::Consensus | CapabilityType::Target => {
                Capability::Executable(shared)
            }
            CapabilityType::Combined => Capability::combined(shared),
            CapabilityType::Unknown => {
                return Err(CapabilityError::public_user(
                    ErrorCode::InvalidArgument,
                    format!("capability {} has unknown type", info.id),
                ));
            }
        };
        Ok(Self {
            info,
            client,
            capability,
        })
    }

    pub fn info(&self) -> &CapabilityInfo {
        &self.info
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn client(&self) -> &CapabilityClient {
        &self.client
    }

    /// Close the underlying connection.
    pub fn close(&self) {
        self.client.close();
    }
}

impl std::fmt::Debug for RegisteredCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCapability")
            .field("info", &self.info)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}
