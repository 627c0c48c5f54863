//! # Delivery Errors

use shared_types::{CapabilityError, ErrorCode};
use thiserror::Error;

/// Failures of an event store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("event store I/O error: {message}")]
    Io { message: String },

    #[error("event store serialization error: {message}")]
    Serialization { message: String },
}

/// Failures of the reliable delivery engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode trigger event: {0}")]
    Encode(String),

    #[error("failed to decode trigger event of type {type_url}: {message}")]
    Decode { type_url: String, message: String },

    #[error("subscriber channel is full")]
    SinkFull,

    #[error("subscriber channel is closed")]
    SinkClosed,

    #[error("delivery engine already started")]
    AlreadyStarted,

    #[error("invalid delivery config: {0}")]
    InvalidConfig(String),
}

impl From<StoreError> for CapabilityError {
    fn from(err: StoreError) -> Self {
        CapabilityError::private_system(ErrorCode::Internal, err.to_string())
    }
}

impl From<DeliveryError> for CapabilityError {
    fn from(err: DeliveryError) -> Self {
        let code = match &err {
            DeliveryError::Store(_) | DeliveryError::Encode(_) | DeliveryError::Decode { .. } => {
                ErrorCode::Internal
            }
            DeliveryError::SinkFull => ErrorCode::ResourceExhausted,
            DeliveryError::SinkClosed => ErrorCode::Unavailable,
            DeliveryError::AlreadyStarted => ErrorCode::FailedPrecondition,
            DeliveryError::InvalidConfig(_) => ErrorCode::InvalidArgument,
        };
        CapabilityError::private_system(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Visibility;

    #[test]
    fn test_wrapped_errors_stay_private() {
        let err: CapabilityError = DeliveryError::Store(StoreError::Io {
            message: "disk on fire".into(),
        })
        .into();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.visibility(), Visibility::Private);
        assert!(err.message().contains("disk on fire"));
    }
}
