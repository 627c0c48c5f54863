//! # Capability Messages
//!
//! Request and response shapes exchanged with capabilities, locally or
//! across the RPC bridge. Values are JSON maps; capabilities decode their
//! typed configuration with [`decode_config`].

use crate::errors::{CapabilityError, ErrorCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Untyped key/value payload carried by requests, responses and events.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;

/// Identifies the workflow step a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestMetadata {
    pub workflow_id: String,
    pub workflow_owner: String,
    pub workflow_execution_id: String,
    pub workflow_name: String,
    pub workflow_don_id: u32,
    pub workflow_don_config_version: u32,
    /// Step reference within the workflow definition.
    pub reference_id: String,
}

/// One-shot call to an action, consensus or target capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityRequest {
    pub metadata: RequestMetadata,
    pub config: ValueMap,
    pub inputs: ValueMap,
}

/// Successful result of an execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityResponse {
    pub value: ValueMap,
}

impl CapabilityResponse {
    pub fn new(value: ValueMap) -> Self {
        Self { value }
    }
}

/// Subscribes a workflow trigger to a trigger capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerRegistrationRequest {
    /// Workflow id plus step index; unique per workflow.
    pub trigger_id: String,
    pub metadata: RequestMetadata,
    pub config: ValueMap,
}

/// An event emitted by a trigger capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerEvent {
    pub trigger_type: String,
    /// Unique per trigger; used for acknowledgement and deduplication.
    pub id: String,
    pub outputs: ValueMap,
}

/// One item on a trigger subscription stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerResponse {
    Event(TriggerEvent),
    Error(CapabilityError),
}

impl TriggerResponse {
    pub fn event(&self) -> Option<&TriggerEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CapabilityError> {
        match self {
            Self::Event(_) => None,
            Self::Error(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<TriggerEvent, CapabilityError> {
        match self {
            Self::Event(event) => Ok(event),
            Self::Error(err) => Err(err),
        }
    }
}

/// Workflow identity attached to (un)registration calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationMetadata {
    pub workflow_id: String,
    pub reference_id: String,
    pub workflow_owner: String,
}

/// `RegisterToWorkflow` / `UnregisterFromWorkflow` payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationRequest {
    pub metadata: RegistrationMetadata,
    pub config: ValueMap,
}

/// Acknowledges receipt of one trigger event by one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AckEventRequest {
    pub trigger_id: String,
    pub workflow_id: String,
    pub event_id: String,
}

/// Decode a request config map into a typed configuration.
///
/// Failures are user errors: the workflow author supplied the config.
pub fn decode_config<T: DeserializeOwned>(config: &ValueMap) -> Result<T, CapabilityError> {
    serde_json::from_value(serde_json::Value::Object(config.clone())).map_err(|e| {
        CapabilityError::public_user(
            ErrorCode::InvalidArgument,
            format!("failed to decode capability config: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct CronConfig {
        schedule: String,
    }

    fn map(value: serde_json::Value) -> ValueMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_decode_config() {
        let config = map(json!({ "schedule": "*/5 * * * *" }));
        let decoded: CronConfig = decode_config(&config).unwrap();
        assert_eq!(decoded.schedule, "*/5 * * * *");
    }

    #[test]
    fn test_decode_config_failure_is_user_error() {
        let config = map(json!({ "schedule": 5 }));
        let err = decode_config::<CronConfig>(&config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(err.origin(), crate::errors::Origin::User);
    }

    #[test]
    fn test_trigger_response_accessors() {
        let event = TriggerEvent {
            trigger_type: "cron".into(),
            id: "e1".into(),
            outputs: ValueMap::new(),
        };
        let ok = TriggerResponse::Event(event.clone());
        assert_eq!(ok.event(), Some(&event));
        assert!(ok.error().is_none());

        let err = TriggerResponse::Error(CapabilityError::public_system(
            ErrorCode::Unavailable,
            "gone",
        ));
        assert!(err.event().is_none());
        assert!(err.into_result().is_err());
    }
}
