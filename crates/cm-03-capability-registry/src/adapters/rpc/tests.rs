//! Registry round trips over TCP, with separate brokers on each side.

use super::*;
use crate::domain::config::RemoteConfig;
use crate::ports::CapabilityRegistryApi;
use crate::service::CapabilityRegistry;
use async_trait::async_trait;
use cm_02_rpc_bridge::{BrokerConfig, EndpointBroker};
use shared_types::{
    BaseCapability, Capability, CapabilityError, CapabilityInfo, CapabilityRequest,
    CapabilityResponse, CapabilityType, Don, ErrorCode, ExecutableCapability, Node, PeerId,
    PEER_ID_LENGTH,
};
use std::sync::Arc;

struct Echo {
    info: CapabilityInfo,
}

#[async_trait]
impl BaseCapability for Echo {
    async fn info(&self) -> Result<CapabilityInfo, CapabilityError> {
        Ok(self.info.clone())
    }
}

#[async_trait]
impl ExecutableCapability for Echo {
    async fn execute(&self, request: CapabilityRequest) -> Result<CapabilityResponse, CapabilityError> {
        Ok(CapabilityResponse::new(request.inputs))
    }
}

fn echo(id: &str, capability_type: CapabilityType) -> Capability {
    Capability::executable(Arc::new(Echo {
        info: CapabilityInfo::new(id, capability_type, "echo").unwrap(),
    }))
}

fn peer(n: u8) -> PeerId {
    PeerId([n; PEER_ID_LENGTH])
}

struct Remote {
    registry: Arc<CapabilityRegistry>,
    client: RegistryClient,
    client_broker: Arc<EndpointBroker>,
}

async fn remote() -> Remote {
    let server_broker = Arc::new(EndpointBroker::new(BrokerConfig::tcp()));
    let registry = Arc::new(CapabilityRegistry::new(server_broker.clone()));
    let handle = server_broker
        .serve(Arc::new(RegistryService::new(registry.clone())))
        .await
        .unwrap();

    let client_broker = Arc::new(EndpointBroker::new(BrokerConfig::tcp()));
    let rpc = client_broker.dial(&handle).await.unwrap();
    Remote {
        registry,
        client: RegistryClient::new(rpc, client_broker.clone()),
        client_broker,
    }
}

#[tokio::test]
async fn test_get_dials_server_published_capability() {
    let r = remote().await;
    r.registry
        .add(echo("echo-action@1.0.0", CapabilityType::Action))
        .await
        .unwrap();

    let found = r.client.get("echo-action@1.0.0").await.unwrap();
    assert_eq!(found.info().id, "echo-action@1.0.0");
    let executable = r.client.get_executable("echo-action@1.0.0").await.unwrap();
    assert!(executable.execute(CapabilityRequest::default()).await.is_ok());
}

#[tokio::test]
async fn test_errors_cross_the_wire_with_codes() {
    let r = remote().await;
    r.registry
        .add(echo("echo-action@1.0.0", CapabilityType::Action))
        .await
        .unwrap();

    let err = r.client.get("missing@1.0.0").await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::NotFound);
    let err = r.client.get_trigger("echo-action@1.0.0").await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
}

#[tokio::test]
async fn test_add_publishes_on_client_broker() {
    let r = remote().await;
    let info = r
        .client
        .add(echo("client-target@1.0.0", CapabilityType::Target))
        .await
        .unwrap();
    assert_eq!(info.capability_type, CapabilityType::Target);
    assert_eq!(r.client_broker.endpoint_count(), 1);

    // The server registry sees it and can dial it over TCP.
    let entry = r.registry.entry("client-target@1.0.0").unwrap();
    assert!(!entry.owned);
    assert!(r.registry.get_executable("client-target@1.0.0").await.is_ok());

    let listed = r.client.list().await.unwrap();
    assert_eq!(listed.len(), 1);

    r.client.remove("client-target@1.0.0").await.unwrap();
    assert!(r.registry.is_empty());
    assert_eq!(r.client_broker.endpoint_count(), 0);
    // Removing again is harmless.
    r.client.remove("client-target@1.0.0").await.unwrap();
}

#[tokio::test]
async fn test_config_and_topology_round_trip() {
    let r = remote().await;
    let workflow = Don::new(1, 2, (1..=4).map(peer).collect(), 1, false, true).unwrap();
    let local = Node {
        peer_id: Some(peer(1)),
        workflow_don: workflow.clone(),
        capability_dons: vec![],
    };
    r.registry.set_local_node(local.clone());
    r.registry
        .add(echo("echo-action@1.0.0", CapabilityType::Consensus))
        .await
        .unwrap();

    assert_eq!(r.client.local_node().await.unwrap(), local);
    assert_eq!(r.client.node_by_peer_id(peer(2)).await.unwrap().workflow_don, workflow);
    let stranger = r.client.node_by_peer_id(peer(50)).await.unwrap();
    assert_eq!(stranger.workflow_don, Don::default());

    let config = r
        .client
        .config_for_capability("echo-action@1.0.0", 1)
        .await
        .unwrap();
    assert!(matches!(config.remote, RemoteConfig::Executable(_)));
}
