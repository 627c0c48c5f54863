//! Method names and payloads of the registry RPC surface.

use cm_02_rpc_bridge::EndpointHandle;
use serde::{Deserialize, Serialize};
use shared_types::{CapabilityInfo, NodeWire};

pub const METHOD_GET: &str = "Registry.Get";
pub const METHOD_GET_TRIGGER: &str = "Registry.GetTrigger";
pub const METHOD_GET_EXECUTABLE: &str = "Registry.GetExecutable";
pub const METHOD_LIST: &str = "Registry.List";
pub const METHOD_ADD: &str = "Registry.Add";
pub const METHOD_REMOVE: &str = "Registry.Remove";
pub const METHOD_CONFIG_FOR_CAPABILITY: &str = "Registry.ConfigForCapability";
pub const METHOD_LOCAL_NODE: &str = "Registry.LocalNode";
pub const METHOD_NODE_BY_PEER_ID: &str = "Registry.NodeByPeerID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub id: String,
    pub don_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequest {
    /// Raw peer id bytes.
    pub peer_id: Vec<u8>,
}

/// A capability and the endpoint it can be dialed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub info: CapabilityInfo,
    pub handle: EndpointHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReply {
    pub node: NodeWire,
}
