//! # Registry Errors

use cm_02_rpc_bridge::BrokerError;
use shared_types::{CapabilityError, CapabilityType, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("capability not found: {0}")]
    NotFound(String),

    #[error("capability already registered: {0}")]
    AlreadyExists(String),

    #[error("capability {id} of type {capability_type} does not satisfy the {contract} capability contract")]
    ContractMismatch {
        id: String,
        capability_type: CapabilityType,
        contract: &'static str,
    },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

impl From<RegistryError> for CapabilityError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => {
                CapabilityError::public_user(ErrorCode::NotFound, err.to_string())
            }
            RegistryError::AlreadyExists(_) => {
                CapabilityError::public_user(ErrorCode::AlreadyExists, err.to_string())
            }
            RegistryError::ContractMismatch { .. } => {
                CapabilityError::public_user(ErrorCode::FailedPrecondition, err.to_string())
            }
            RegistryError::Broker(broker) => broker.into(),
            RegistryError::Capability(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Origin;

    #[test]
    fn test_contract_mismatch_is_user_error() {
        let err: CapabilityError = RegistryError::ContractMismatch {
            id: "cron-trigger@1.0.0".into(),
            capability_type: CapabilityType::Trigger,
            contract: "executable",
        }
        .into();
        assert_eq!(err.code(), ErrorCode::FailedPrecondition);
        assert_eq!(err.origin(), Origin::User);
        assert!(err.message().contains("does not satisfy the executable capability contract"));
    }

    #[test]
    fn test_capability_errors_pass_through() {
        let inner = CapabilityError::private_system(ErrorCode::Internal, "boom");
        let err: CapabilityError = RegistryError::Capability(inner.clone()).into();
        assert_eq!(err, inner);
    }
}
