//! # Capability Registry Service
//!
//! Maps capability ids to published endpoints. `add` serves the capability
//! through a [`CapabilityService`] on a fresh broker endpoint; lookups dial
//! that endpoint and hand back a [`CapabilityClient`], so a caller never
//! needs to know whether the capability lives in this process.
//!
//! The id table is a `DashMap`: `add`, `remove` and lookups may run
//! concurrently, and a lookup racing an `add` sees either the old or the
//! new mapping.

use crate::domain::config::{CapabilityConfiguration, RemoteConfig};
use crate::domain::errors::RegistryError;
use crate::ports::{CapabilityRegistryApi, RegisteredCapability};
use async_trait::async_trait;
use cm_02_rpc_bridge::{
    CapabilityClient, CapabilityService, EndpointBroker, EndpointHandle, ServerOptions,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use shared_types::metrics::names;
use shared_types::{
    validate_capability_id, Capability, CapabilityError, CapabilityInfo, Don,
    ExecutableCapability, MetricsSink, Node, NoopMetrics, PeerId, TriggerCapability,
};
use std::sync::Arc;
use tracing::{debug, info, warn};


/// Where a registered capability can be dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub info: CapabilityInfo,
    pub handle: EndpointHandle,
    /// Published by this registry, so removing the entry closes the endpoint.
    pub owned: bool,
}

#[derive(Debug, Default)]
struct Topology {
    local: Node,
    /// Every DON known to this node, used to resolve other peers.
    dons: Vec<Don>,
}

pub struct CapabilityRegistry {
    broker: Arc<EndpointBroker>,
    options: ServerOptions,
    metrics: Arc<dyn MetricsSink>,
    entries: DashMap<String, RegistryEntry>,
    configs: DashMap<(String, u32), CapabilityConfiguration>,
    topology: RwLock<Topology>,
}

impl CapabilityRegistry {
    pub fn new(broker: Arc<EndpointBroker>) -> Self {
        Self {
            broker,
            options: ServerOptions::default(),
            metrics: NoopMetrics::shared(),
            entries: DashMap::new(),
            configs: DashMap::new(),
            topology: RwLock::new(Topology::default()),
        }
    }

    /// Options for the capability servers this registry publishes.
    pub fn with_server_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn broker(&self) -> &Arc<EndpointBroker> {
        &self.broker
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: &str) -> Option<RegistryEntry> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    pub fn lookup(&self, id: &str) -> Result<RegistryEntry, RegistryError> {
        self.entry(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    // =========================================================================
    // Topology and configuration
    // =========================================================================

    pub fn set_local_node(&self, node: Node) {
        let mut topology = self.topology.write();
        for don in node.all_dons() {
            if !topology.dons.iter().any(|known| known.id == don.id) {
                topology.dons.push(don.clone());
            }
        }
        topology.local = node;
    }

    /// Replace the set of known DONs. The local node's DONs stay known.
    pub fn set_dons(&self, dons: Vec<Don>) {
        let mut topology = self.topology.write();
        let mut merged = dons;
        for don in topology.local.all_dons() {
            if !merged.iter().any(|known| known.id == don.id) {
                merged.push(don.clone());
            }
        }
        topology.dons = merged;
    }

    pub fn set_config(&self, id: impl Into<String>, don_id: u32, config: CapabilityConfiguration) {
        self.configs.insert((id.into(), don_id), config);
    }

    pub fn local_node(&self) -> Node {
        self.topology.read().local.clone()
    }

    /// Resolve `peer` against the known DONs: the first workflow-accepting
    /// DON containing it becomes its workflow DON, the rest its capability
    /// DONs.
    pub fn node_by_peer_id(&self, peer: PeerId) -> Node {
        let topology = self.topology.read();
        if topology.local.peer_id == Some(peer) {
            return topology.local.clone();
        }

        let mut node = Node {
            peer_id: Some(peer),
            ..Node::default()
        };
        let mut workflow_don = None;
        for don in topology.dons.iter().filter(|don| don.contains(&peer)) {
            if don.accepts_workflows && workflow_don.is_none() {
                workflow_don = Some(don.clone());
            } else {
                node.capability_dons.push(don.clone());
            }
        }
        if let Some(don) = workflow_don {
            node.workflow_don = don;
        }
        node
    }

    /// Configuration of `id` on `don_id` with defaults applied.
    ///
    /// Falls back to the default section for the registered type when
    /// nothing was configured.
    pub fn config_for_capability(
        &self,
        id: &str,
        don_id: u32,
    ) -> Result<CapabilityConfiguration, RegistryError> {
        let configured = self
            .configs
            .get(&(id.to_string(), don_id))
            .map(|config| config.clone());
        let mut config = match configured {
            Some(config) => config,
            None => {
                let entry = self
                    .entries
                    .get(id)
                    .map(|entry| entry.info.capability_type)
                    .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
                let remote = RemoteConfig::for_type(entry)
                    .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
                CapabilityConfiguration::new(remote)
            }
        };

        let quorum = self
            .topology
            .read()
            .dons
            .iter()
            .find(|don| don.id == don_id)
            .map(Don::honest_quorum);
        config.apply_defaults(quorum);
        Ok(config)
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Publish a local capability.
    pub async fn add(&self, capability: Capability) -> Result<CapabilityInfo, RegistryError> {
        let info = capability.info().await?;
        validate_capability_id(&info.id)?;
        capability.check_info(&info)?;
        if self.entries.contains_key(&info.id) {
            return Err(RegistryError::AlreadyExists(info.id));
        }

        let service = CapabilityService::new(capability, self.options)
            .with_metrics(self.metrics.clone());
        let handle = self.broker.serve(Arc::new(service)).await?;

        let entry = RegistryEntry {
            info: info.clone(),
            handle,
            owned: true,
        };
        if let Err(err) = self.insert(entry) {
            // Lost a race with a concurrent add of the same id.
            self.broker.close(handle.id);
            return Err(err);
        }
        info!(capability_id = %info.id, endpoint = %handle, "[Registry] Capability added");
        Ok(info)
    }

    /// Record a capability published elsewhere, typically by a remote
    /// registry client.
    pub fn add_endpoint(
        &self,
        info: CapabilityInfo,
        handle: EndpointHandle,
    ) -> Result<(), RegistryError> {
        validate_capability_id(&info.id)?;
        let id = info.id.clone();
        self.insert(RegistryEntry {
            info,
            handle,
            owned: false,
        })?;
        info!(capability_id = %id, endpoint = %handle, "[Registry] Remote endpoint added");
        Ok(())
    }

    fn insert(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        match self.entries.entry(entry.info.id.clone()) {
            Entry::Occupied(occupied) => Err(RegistryError::AlreadyExists(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                self.report_size();
                Ok(())
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<RegisteredCapability, RegistryError> {
        let entry = self.lookup(id)?;
        self.dial(entry).await
    }

    pub async fn get_trigger(&self, id: &str) -> Result<Arc<dyn TriggerCapability>, RegistryError> {
        let entry = self.trigger_entry(id)?;
        let client = self.dial_client(&entry).await?;
        Ok(Arc::new(client))
    }

    pub async fn get_executable(
        &self,
        id: &str,
    ) -> Result<Arc<dyn ExecutableCapability>, RegistryError> {
        let entry = self.executable_entry(id)?;
        let client = self.dial_client(&entry).await?;
        Ok(Arc::new(client))
    }

    /// The entry of `id` if it satisfies the trigger contract.
    pub fn trigger_entry(&self, id: &str) -> Result<RegistryEntry, RegistryError> {
        let entry = self.lookup(id)?;
        if !entry.info.capability_type.is_trigger() {
            return Err(contract_mismatch(entry, "trigger"));
        }
        Ok(entry)
    }

    /// The entry of `id` if it satisfies the executable contract.
    pub fn executable_entry(&self, id: &str) -> Result<RegistryEntry, RegistryError> {
        let entry = self.lookup(id)?;
        if !entry.info.capability_type.is_executable() {
            return Err(contract_mismatch(entry, "executable"));
        }
        Ok(entry)
    }

    /// Snapshot of every entry, ordered by id.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| a.info.id.cmp(&b.info.id));
        entries
    }

    /// Dial every registered capability in id order.
    ///
    /// On the first failure every handle already dialed by this call is
    /// closed before the error is returned.
    pub async fn list(&self) -> Result<Vec<RegisteredCapability>, RegistryError> {
        let entries = self.entries();
        let mut dialed = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.info.id.clone();
            match self.dial(entry).await {
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

    /// Forget `id` and close its endpoint if this registry published it.
    pub fn remove(&self, id: &str) -> bool {
        let Some((_, entry)) = self.entries.remove(id) else {
            debug!(capability_id = %id, "[Registry] Remove of unknown capability ignored");
            return false;
        };
        if entry.owned {
            self.broker.close(entry.handle.id);
        }
        self.report_size();
        info!(capability_id = %id, "[Registry] Capability removed");
        true
    }

    async fn dial_client(&self, entry: &RegistryEntry) -> Result<CapabilityClient, RegistryError> {
        let rpc = self.broker.dial(&entry.handle).await?;
        debug!(capability_id = %entry.info.id, endpoint = %entry.handle, "[Registry] Dialed capability");
        Ok(CapabilityClient::new(rpc))
    }

    async fn dial(&self, entry: RegistryEntry) -> Result<RegisteredCapability, RegistryError> {
        let client = self.dial_client(&entry).await?;
        Ok(RegisteredCapability::new(entry.info, client)?)
    }

    fn report_size(&self) {
        self.metrics
            .set_gauge(names::REGISTRY_CAPABILITIES, &[], self.entries.len() as f64);
    }
}

fn contract_mismatch(entry: RegistryEntry, contract: &'static str) -> RegistryError {
    RegistryError::ContractMismatch {
        id: entry.info.id,
        capability_type: entry.info.capability_type,
        contract,
    }
}

#[async_trait]
impl CapabilityRegistryApi for CapabilityRegistry {
    async fn add(&self, capability: Capability) -> Result<CapabilityInfo, CapabilityError> {
        Ok(CapabilityRegistry::add(self, capability).await?)
    }

    async fn get(&self, id: &str) -> Result<RegisteredCapability, CapabilityError> {
        Ok(CapabilityRegistry::get(self, id).await?)
    }

    async fn get_trigger(&self, id: &str) -> Result<Arc<dyn TriggerCapability>, CapabilityError> {
        Ok(CapabilityRegistry::get_trigger(self, id).await?)
    }

    async fn get_executable(
        &self,
        id: &str,
    ) -> Result<Arc<dyn ExecutableCapability>, CapabilityError> {
        Ok(CapabilityRegistry::get_executable(self, id).await?)
    }

    async fn list(&self) -> Result<Vec<RegisteredCapability>, CapabilityError> {
        Ok(CapabilityRegistry::list(self).await?)
    }

    async fn remove(&self, id: &str) -> Result<(), CapabilityError> {
        CapabilityRegistry::remove(self, id);
        Ok(())
    }

    async fn config_for_capability(
        &self,
        id: &str,
        don_id: u32,
    ) -> Result<CapabilityConfiguration, CapabilityError> {
        Ok(CapabilityRegistry::config_for_capability(self, id, don_id)?)
    }

    async fn local_node(&self) -> Result<Node, CapabilityError> {
        Ok(CapabilityRegistry::local_node(self))
    }

    async fn node_by_peer_id(&self, peer_id: PeerId) -> Result<Node, CapabilityError> {
        Ok(CapabilityRegistry::node_by_peer_id(self, peer_id))
    }
}
