//! Capabilities and helpers shared by the integration tests and benchmarks.

use async_trait::async_trait;
use cm_01_reliable_delivery::{DeliveryConfig, EventStore, ReliableDeliveryEngine};
use cm_02_rpc_bridge::{BrokerConfig, EndpointAddress, EndpointBroker, EndpointHandle};
use cm_03_capability_registry::RegistryClient;
use shared_types::{
    BaseCapability, CapabilityError, CapabilityInfo, CapabilityRequest, CapabilityResponse,
    CapabilityType, ErrorCode, ExecutableCapability, RequestMetadata, TriggerRegistrationRequest,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Echoes its inputs back; fails when the inputs carry `fail`.
///
/// `fail = "private"` fails with a private system error, any other value
/// with a public user error.
pub struct EchoAction {
    info: CapabilityInfo,
}

impl EchoAction {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            info: CapabilityInfo::new(id, CapabilityType::Action, "echoes its inputs")
                .expect("valid capability id"),
        })
    }
}

#[async_trait]
impl BaseCapability for EchoAction {
    async fn info(&self) -> Result<CapabilityInfo, CapabilityError> {
        Ok(self.info.clone())
    }
}

#[async_trait]
impl ExecutableCapability for EchoAction {
    async fn execute(&self, request: CapabilityRequest) -> Result<CapabilityResponse, CapabilityError> {
        match request.inputs.get("fail").and_then(|v| v.as_str()) {
            Some("private") => Err(CapabilityError::private_system(
                ErrorCode::Internal,
                "connection to 10.0.0.7:5432 refused",
            )),
            Some(reason) => Err(CapabilityError::public_user(
                ErrorCode::InvalidArgument,
                format!("rejected input: {reason}"),
            )),
            None => Ok(CapabilityResponse::new(request.inputs)),
        }
    }
}

pub fn registration(trigger_id: &str, workflow_id: &str) -> TriggerRegistrationRequest {
    TriggerRegistrationRequest {
        trigger_id: trigger_id.to_string(),
        metadata: RequestMetadata {
            workflow_id: workflow_id.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn request_with(key: &str, value: serde_json::Value) -> CapabilityRequest {
    let mut request = CapabilityRequest::default();
    request.inputs.insert(key.to_string(), value);
    request
}

/// Delivery engine with short timings.
pub fn fast_engine(name: &str, store: Arc<dyn EventStore>) -> Arc<ReliableDeliveryEngine> {
    Arc::new(
        ReliableDeliveryEngine::builder(store)
            .name(name)
            .config(DeliveryConfig::for_testing())
            .build()
            .expect("valid delivery config"),
    )
}

/// Dial a registry listening on `addr` with a fresh TCP broker.
pub async fn registry_client(addr: SocketAddr) -> RegistryClient {
    let broker = Arc::new(EndpointBroker::new(BrokerConfig::tcp()));
    let handle = EndpointHandle {
        id: 0,
        address: EndpointAddress::Tcp(addr),
    };
    let rpc = broker.dial(&handle).await.expect("registry reachable");
    RegistryClient::new(rpc, broker)
}
