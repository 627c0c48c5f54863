//! # Capability Error Taxonomy
//!
//! Every failure that crosses a capability or node boundary is classified
//! along three axes:
//!
//! - **Origin**: did the system or the user (input, configuration) cause it
//! - **Visibility**: may the message be disclosed to other nodes
//! - **Code**: a stable identifier that survives version skew between nodes
//!
//! ## Wire Format
//!
//! ```text
//! Visibility ":" Origin ":" Code ":" Message
//! ```
//!
//! The message may itself contain colons; parsing stops after the fourth
//! segment. Strings with fewer than four segments are legacy errors and are
//! decoded as `Private:System:Unknown:<whole string>`. Unrecognised tokens
//! decode to the `Invalid` sentinel of that axis instead of failing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Message sent in place of a private error's message when it is
/// serialized for a remote peer.
pub const REDACTED_ERROR_MESSAGE: &str =
    "error whilst executing capability - the error message is not publicly reportable";

/// Separator between the serialized fields.
const FIELD_SEPARATOR: char = ':';

/// Number of fields in a serialized error.
const FIELD_COUNT: usize = 4;

/// Who caused a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The node or capability itself failed.
    System,
    /// User-supplied input or configuration is at fault.
    User,
    /// Token not understood by this node.
    Invalid,
}

impl Origin {
    /// Stable wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Invalid => "Invalid",
        }
    }

    fn from_token(token: &str) -> Self {
        match token {
            "System" => Self::System,
            "User" => Self::User,
            _ => Self::Invalid,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an error message may be revealed to other nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Safe to send verbatim to peers.
    Public,
    /// Only the local node may see the message.
    Private,
    /// Token not understood by this node.
    Invalid,
}

impl Visibility {
    /// Stable wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
            Self::Invalid => "Invalid",
        }
    }

    fn from_token(token: &str) -> Self {
        match token {
            "Public" => Self::Public,
            "Private" => Self::Private,
            _ => Self::Invalid,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error codes.
///
/// Numeric values are part of the compatibility contract and must never be
/// reassigned. `Invalid` (0) is reserved for codes this node does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    Invalid = 0,
    Unknown = 1,
    InvalidArgument = 2,
    DeadlineExceeded = 3,
    NotFound = 4,
    AlreadyExists = 5,
    PermissionDenied = 6,
    ResourceExhausted = 7,
    FailedPrecondition = 8,
    Aborted = 9,
    OutOfRange = 10,
    Unimplemented = 11,
    Internal = 12,
    Unavailable = 13,
    DataLoss = 14,
    Unauthenticated = 15,
    ConsensusFailed = 16,
}

impl ErrorCode {
    /// Every known code, `Invalid` included.
    pub const ALL: [ErrorCode; 17] = [
        Self::Invalid,
        Self::Unknown,
        Self::InvalidArgument,
        Self::DeadlineExceeded,
        Self::NotFound,
        Self::AlreadyExists,
        Self::PermissionDenied,
        Self::ResourceExhausted,
        Self::FailedPrecondition,
        Self::Aborted,
        Self::OutOfRange,
        Self::Unimplemented,
        Self::Internal,
        Self::Unavailable,
        Self::DataLoss,
        Self::Unauthenticated,
        Self::ConsensusFailed,
    ];

    /// Stable numeric value.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Map a numeric value back to a code; unknown values become `Invalid`.
    pub fn from_u32(value: u32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_u32() == value)
            .unwrap_or(Self::Invalid)
    }

    /// Stable wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Unknown => "Unknown",
            Self::InvalidArgument => "InvalidArgument",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::Aborted => "Aborted",
            Self::OutOfRange => "OutOfRange",
            Self::Unimplemented => "Unimplemented",
            Self::Internal => "Internal",
            Self::Unavailable => "Unavailable",
            Self::DataLoss => "DataLoss",
            Self::Unauthenticated => "Unauthenticated",
            Self::ConsensusFailed => "ConsensusFailed",
        }
    }

    fn from_token(token: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == token)
            .unwrap_or(Self::Invalid)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified capability-layer error.
///
/// Immutable once constructed. Equality is structural over all four fields,
/// so replayed errors compare equal to the original.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("[{code}] {message}")]
pub struct CapabilityError {
    message: String,
    origin: Origin,
    visibility: Visibility,
    code: ErrorCode,
}

impl CapabilityError {
    /// Create an error with explicit classification.
    pub fn new(
        code: ErrorCode,
        origin: Origin,
        visibility: Visibility,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            origin,
            visibility,
            code,
        }
    }

    /// System fault whose message peers may see.
    pub fn public_system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Origin::System, Visibility::Public, message)
    }

    /// System fault whose message stays on this node.
    pub fn private_system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Origin::System, Visibility::Private, message)
    }

    /// User fault whose message peers may see.
    pub fn public_user(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Origin::User, Visibility::Public, message)
    }

    /// User fault whose message stays on this node.
    pub fn private_user(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Origin::User, Visibility::Private, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// `true` only for explicitly public errors.
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Copy of this error that is safe to hand to a remote peer.
    ///
    /// Anything not explicitly public (including an `Invalid` visibility)
    /// has its message replaced by [`REDACTED_ERROR_MESSAGE`].
    pub fn redacted(&self) -> Self {
        if self.is_public() {
            return self.clone();
        }
        Self {
            message: REDACTED_ERROR_MESSAGE.to_string(),
            ..self.clone()
        }
    }

    /// Full serialization for local use. Never redacts.
    pub fn serialize_to_string(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.visibility,
            self.origin,
            self.code,
            self.message,
            sep = FIELD_SEPARATOR
        )
    }

    /// Serialization for a remote peer; private messages are redacted.
    pub fn serialize_to_remote_string(&self) -> String {
        self.redacted().serialize_to_string()
    }

    /// Decode a serialized error. Never fails.
    pub fn from_serialized(serialized: &str) -> Self {
        let parts: Vec<&str> = serialized.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();
        let [visibility, origin, code, message] = parts.as_slice() else {
            // Legacy, unclassified error string.
            return Self::private_system(ErrorCode::Unknown, serialized);
        };

        Self {
            message: (*message).to_string(),
            origin: Origin::from_token(origin),
            visibility: Visibility::from_token(visibility),
            code: ErrorCode::from_token(code),
        }
    }
}

impl FromStr for CapabilityError {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_serialized(s))
    }
}

impl Serialize for CapabilityError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.serialize_to_string())
    }
}

impl<'de> Deserialize<'de> for CapabilityError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let serialized = String::deserialize(deserializer)?;
        Ok(Self::from_serialized(&serialized))
    }
}
