//! JSON event codec.

use crate::domain::errors::DeliveryError;
use crate::ports::EventCodec;
use shared_types::TriggerEvent;

/// Type url stamped on events encoded by [`JsonEventCodec`].
pub const JSON_EVENT_TYPE_URL: &str = "type.capability.mesh/trigger_event.v1+json";

/// Stores the whole `TriggerEvent` as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEventCodec;

impl EventCodec for JsonEventCodec {
    fn encode(&self, event: &TriggerEvent) -> Result<(String, Vec<u8>), DeliveryError> {
        let payload = serde_json::to_vec(event).map_err(|e| DeliveryError::Encode(e.to_string()))?;
        Ok((JSON_EVENT_TYPE_URL.to_string(), payload))
    }

    fn decode(&self, type_url: &str, payload: &[u8]) -> Result<TriggerEvent, DeliveryError> {
        if type_url != JSON_EVENT_TYPE_URL {
            return Err(DeliveryError::Decode {
                type_url: type_url.to_string(),
                message: "unsupported type url".into(),
            });
        }
        serde_json::from_slice(payload).map_err(|e| DeliveryError::Decode {
            type_url: type_url.to_string(),
            message: e.to_string(),
        })
    }
}
