//! # Bridge Errors
//!
//! `RpcError` covers one call or stream; `BrokerError` covers endpoint
//! management. Both wrap into `CapabilityError` before reaching a caller
//! that speaks the capability contracts.

use shared_types::{CapabilityError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The connection is gone: peer crash, explicit close or server shutdown.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("frame codec error: {0}")]
    Codec(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("call cancelled")]
    Cancelled,

    /// The server handled the call and reported a failure.
    #[error("{0}")]
    Remote(CapabilityError),
}

impl RpcError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_))
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        Self::TransportUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<RpcError> for CapabilityError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote(remote) => remote,
            RpcError::TransportUnavailable(_) => {
                CapabilityError::public_system(ErrorCode::Unavailable, err.to_string())
            }
            RpcError::Cancelled => CapabilityError::public_system(ErrorCode::Aborted, err.to_string()),
            RpcError::Codec(_) | RpcError::Protocol(_) => {
                CapabilityError::private_system(ErrorCode::Internal, err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("endpoint {0} not found")]
    NotFound(u64),

    #[error("failed to bind endpoint listener: {0}")]
    Bind(String),

    #[error("failed to dial endpoint {id}: {message}")]
    Dial { id: u64, message: String },

    #[error("endpoint broker is shut down")]
    ShutDown,
}

impl From<BrokerError> for CapabilityError {
    fn from(err: BrokerError) -> Self {
        let code = match &err {
            BrokerError::NotFound(_) => ErrorCode::NotFound,
            BrokerError::Bind(_) => ErrorCode::Internal,
            BrokerError::Dial { .. } | BrokerError::ShutDown => ErrorCode::Unavailable,
        };
        CapabilityError::private_system(code, err.to_string())
    }
}
