//! Method names and message shapes of the capability RPC surface.

use serde::{Deserialize, Serialize};
use shared_types::{CapabilityError, CapabilityResponse, TriggerResponse};

pub const METHOD_INFO: &str = "Info";
pub const METHOD_EXECUTE: &str = "Execute";
pub const METHOD_REGISTER_TRIGGER: &str = "RegisterTrigger";
pub const METHOD_UNREGISTER_TRIGGER: &str = "UnregisterTrigger";
pub const METHOD_ACK_EVENT: &str = "AckEvent";
pub const METHOD_REGISTER_TO_WORKFLOW: &str = "RegisterToWorkflow";
pub const METHOD_UNREGISTER_FROM_WORKFLOW: &str = "UnregisterFromWorkflow";

/// The single item of an `Execute` stream.
///
/// Application failures travel in `error`, never as a stream failure, so
/// the caller always sees the full error taxonomy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecuteReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CapabilityResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CapabilityError>,
}

impl ExecuteReply {
    pub fn from_result(result: Result<CapabilityResponse, CapabilityError>) -> Self {
        match result {
            Ok(value) => Self {
                value: Some(value),
                error: None,
            },
            Err(error) => Self {
                value: None,
                error: Some(error),
            },
        }
    }

    pub fn into_result(self) -> Result<CapabilityResponse, CapabilityError> {
        match (self.error, self.value) {
            (Some(error), _) => Err(error),
            (None, Some(value)) => Ok(value),
            (None, None) => Ok(CapabilityResponse::default()),
        }
    }
}

/// Items of a `RegisterTrigger` stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TriggerStreamItem {
    /// First item: the capability accepted the registration.
    Registered,
    Response(TriggerResponse),
}
