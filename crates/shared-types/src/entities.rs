//! # Capability Identity
//!
//! A capability is named by an id of the form `name@semver`, for example
//! `write_ethereum-testnet-sepolia@1.0.0`. The embedded version is immutable:
//! behavior published under an id must never change.
//!
//! ## Id Rules
//!
//! - Name: lowercase ASCII letters, digits, `_`, `-`, `:`
//! - Version: SemVer 2.0 (`MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`)
//! - At most [`MAX_CAPABILITY_ID_LENGTH`] characters in total

use crate::errors::{CapabilityError, ErrorCode};
use crate::topology::Don;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted capability id.
pub const MAX_CAPABILITY_ID_LENGTH: usize = 128;

/// The kind of work a capability performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityType {
    /// Pushes events to subscribers.
    Trigger,
    /// Called for a result.
    Action,
    /// Aggregates observations across a DON.
    Consensus,
    /// Writes results out of the network.
    Target,
    /// Implements both the trigger and the executable contracts.
    Combined,
    #[default]
    Unknown,
}

impl CapabilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Action => "action",
            Self::Consensus => "consensus",
            Self::Target => "target",
            Self::Combined => "combined",
            Self::Unknown => "unknown",
        }
    }

    /// One of trigger, action, consensus, target.
    pub fn is_concrete(&self) -> bool {
        matches!(
            self,
            Self::Trigger | Self::Action | Self::Consensus | Self::Target
        )
    }

    /// Satisfies the trigger contract.
    pub fn is_trigger(&self) -> bool {
        matches!(self, Self::Trigger | Self::Combined)
    }

    /// Satisfies the executable (callback) contract.
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            Self::Action | Self::Consensus | Self::Target | Self::Combined
        )
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a capability: its id, kind and where it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    pub id: String,
    pub capability_type: CapabilityType,
    pub description: String,
    /// DON hosting the capability, set for remote capabilities.
    pub don: Option<Don>,
    pub is_local: bool,
}

impl CapabilityInfo {
    /// Create info for a local capability of one of the four concrete types.
    pub fn new(
        id: impl Into<String>,
        capability_type: CapabilityType,
        description: impl Into<String>,
    ) -> Result<Self, CapabilityError> {
        let id = id.into();
        validate_capability_id(&id)?;
        if !capability_type.is_concrete() {
            return Err(CapabilityError::public_user(
                ErrorCode::InvalidArgument,
                format!("invalid capability type: {capability_type}"),
            ));
        }

        Ok(Self {
            id,
            capability_type,
            description: description.into(),
            don: None,
            is_local: true,
        })
    }

    /// Create info for a local capability implementing both contracts.
    pub fn combined(
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, CapabilityError> {
        let id = id.into();
        validate_capability_id(&id)?;
        Ok(Self {
            id,
            capability_type: CapabilityType::Combined,
            description: description.into(),
            don: None,
            is_local: true,
        })
    }

    /// Create info for a capability hosted on another DON.
    pub fn new_remote(
        id: impl Into<String>,
        capability_type: CapabilityType,
        description: impl Into<String>,
        don: Don,
    ) -> Result<Self, CapabilityError> {
        let mut info = Self::new(id, capability_type, description)?;
        info.don = Some(don);
        info.is_local = false;
        Ok(info)
    }

    /// The semantic version embedded in the id (text after the last `@`).
    pub fn version(&self) -> &str {
        self.id
            .rsplit_once('@')
            .map(|(_, version)| version)
            .unwrap_or_default()
    }
}

/// Check an id against the `name@semver` grammar and length limit.
pub fn validate_capability_id(id: &str) -> Result<(), CapabilityError> {
    let invalid = |reason: &str| {
        CapabilityError::public_user(
            ErrorCode::InvalidArgument,
            format!("invalid capability id {id:?}: {reason}"),
        )
    };

    if id.len() > MAX_CAPABILITY_ID_LENGTH {
        return Err(invalid("longer than 128 characters"));
    }

    let Some((name, version)) = id.split_once('@') else {
        return Err(invalid("missing @version"));
    };

    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"_-:".contains(&b))
    {
        return Err(invalid("name must match [a-z0-9_-:]+"));
    }

    if !is_semver(version) {
        return Err(invalid("version is not a semantic version"));
    }

    Ok(())
}

/// SemVer 2.0 validation.
fn is_semver(version: &str) -> bool {
    let (rest, build) = match version.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (version, None),
    };
    let (core, pre_release) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let numbers: Vec<&str> = core.split('.').collect();
    if numbers.len() != 3 || !numbers.iter().all(|n| is_numeric_identifier(n)) {
        return false;
    }

    if let Some(pre) = pre_release {
        let valid = pre.split('.').all(|ident| {
            if ident.bytes().all(|b| b.is_ascii_digit()) {
                is_numeric_identifier(ident)
            } else {
                is_alphanumeric_identifier(ident)
            }
        });
        if !valid {
            return false;
        }
    }

    match build {
        Some(build) => build.split('.').all(is_alphanumeric_identifier),
        None => true,
    }
}

/// `0` or a number without leading zeros.
fn is_numeric_identifier(ident: &str) -> bool {
    !ident.is_empty()
        && ident.bytes().all(|b| b.is_ascii_digit())
        && (ident == "0" || !ident.starts_with('0'))
}

fn is_alphanumeric_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in [
            "capability-id@1.0.0",
            "capability-id@1.0.0-beta",
            "capability-id@1.0.0+build.1",
            "write_chain:evm-11155111@10.20.30-rc.1+sha.5114f85",
            "a@0.0.0",
        ] {
            assert!(validate_capability_id(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn test_invalid_ids() {
        for id in [
            "capability-id@v1.0.0",
            "capability-id@1.0",
            "capability-id@1",
            "capability-id",
            "Capability@1.0.0",
            "@1.0.0",
            "cap@01.0.0",
            "cap@1.0.0-",
            "cap@1.0.0-01",
            "cap@1.0.0+",
            "cap id@1.0.0",
        ] {
            assert!(validate_capability_id(id).is_err(), "{id} should be invalid");
        }
    }

    #[test]
    fn test_id_length_limit() {
        let suffix = "@1.0.0";
        let ok = format!("{}{}", "a".repeat(MAX_CAPABILITY_ID_LENGTH - suffix.len()), suffix);
        assert!(validate_capability_id(&ok).is_ok());

        let too_long = format!("a{ok}");
        let err = validate_capability_id(&too_long).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_new_rejects_non_concrete_types() {
        assert!(CapabilityInfo::new("cap@1.0.0", CapabilityType::Unknown, "").is_err());
        assert!(CapabilityInfo::new("cap@1.0.0", CapabilityType::Combined, "").is_err());
        assert!(CapabilityInfo::new("cap@1.0.0", CapabilityType::Target, "").is_ok());
    }

    #[test]
    fn test_combined_info() {
        let info = CapabilityInfo::combined("both@2.1.0", "trigger and action").unwrap();
        assert_eq!(info.capability_type, CapabilityType::Combined);
        assert!(info.capability_type.is_trigger());
        assert!(info.capability_type.is_executable());
    }

    #[test]
    fn test_version_extraction() {
        let info = CapabilityInfo::new("cron@1.2.3-beta+exp", CapabilityType::Trigger, "").unwrap();
        assert_eq!(info.version(), "1.2.3-beta+exp");
    }

    #[test]
    fn test_remote_info() {
        let don = Don::default();
        let info =
            CapabilityInfo::new_remote("cap@1.0.0", CapabilityType::Action, "", don.clone()).unwrap();
        assert!(!info.is_local);
        assert_eq!(info.don, Some(don));
    }

    #[test]
    fn test_type_serde_is_lowercase() {
        let json = serde_json::to_string(&CapabilityType::Consensus).unwrap();
        assert_eq!(json, "\"consensus\"");
    }
}
