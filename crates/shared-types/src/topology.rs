//! # DON Topology
//!
//! A DON (Decentralized Oracle Network) is a versioned set of peers that
//! tolerates up to `f` Byzantine members. A node belongs to at most one
//! workflow DON and to any number of capability DONs.
//!
//! The `*Wire` types are the transport representation (peer ids as raw byte
//! vectors, `f` widened to `u32`). Conversion in both directions is lossless
//! for every valid value.

use crate::errors::{CapabilityError, ErrorCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Length of a peer identifier in bytes.
pub const PEER_ID_LENGTH: usize = 32;

/// Fixed-width peer identifier (an Ed25519 public key on the wire).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerId(pub [u8; PEER_ID_LENGTH]);

impl PeerId {
    pub fn as_bytes(&self) -> &[u8; PEER_ID_LENGTH] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CapabilityError> {
        let raw: [u8; PEER_ID_LENGTH] = bytes.try_into().map_err(|_| {
            CapabilityError::public_user(
                ErrorCode::InvalidArgument,
                format!(
                    "peer id must be {PEER_ID_LENGTH} bytes, got {}",
                    bytes.len()
                ),
            )
        })?;
        Ok(Self(raw))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl FromStr for PeerId {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| {
            CapabilityError::public_user(
                ErrorCode::InvalidArgument,
                format!("peer id is not valid hex: {e}"),
            )
        })?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A decentralized oracle network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Don {
    pub id: u32,
    pub config_version: u32,
    /// Members in registration order; no duplicates.
    pub members: Vec<PeerId>,
    /// Maximum number of faulty members tolerated.
    pub f: u8,
    pub is_public: bool,
    pub accepts_workflows: bool,
}

impl Don {
    /// Create a DON, enforcing the BFT membership bound.
    pub fn new(
        id: u32,
        config_version: u32,
        members: Vec<PeerId>,
        f: u8,
        is_public: bool,
        accepts_workflows: bool,
    ) -> Result<Self, CapabilityError> {
        let don = Self {
            id,
            config_version,
            members,
            f,
            is_public,
            accepts_workflows,
        };
        don.validate()?;
        Ok(don)
    }

    /// Check `len(members) >= 3f + 1` (when `f > 0`) and member uniqueness.
    pub fn validate(&self) -> Result<(), CapabilityError> {
        if self.f > 0 {
            let required = 3 * usize::from(self.f) + 1;
            if self.members.len() < required {
                return Err(CapabilityError::public_user(
                    ErrorCode::InvalidArgument,
                    format!(
                        "DON {} tolerates f={} but has {} members, need at least {}",
                        self.id,
                        self.f,
                        self.members.len(),
                        required
                    ),
                ));
            }
        }

        let mut seen = HashSet::with_capacity(self.members.len());
        if let Some(duplicate) = self.members.iter().find(|m| !seen.insert(**m)) {
            return Err(CapabilityError::public_user(
                ErrorCode::InvalidArgument,
                format!("DON {} lists member {} twice", self.id, duplicate),
            ));
        }
        Ok(())
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.members.contains(peer)
    }

    /// Responses needed so that at least one comes from an honest member.
    pub fn honest_quorum(&self) -> u32 {
        u32::from(self.f) + 1
    }
}

/// A node's view of its place in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub peer_id: Option<PeerId>,
    pub workflow_don: Don,
    pub capability_dons: Vec<Don>,
}

impl Node {
    /// Every DON this node participates in, workflow DON first.
    pub fn all_dons(&self) -> impl Iterator<Item = &Don> {
        std::iter::once(&self.workflow_don).chain(self.capability_dons.iter())
    }

    pub fn don_by_id(&self, don_id: u32) -> Option<&Don> {
        self.all_dons().find(|don| don.id == don_id)
    }
}

/// Transport form of [`Don`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DonWire {
    pub id: u32,
    pub config_version: u32,
    pub members: Vec<Vec<u8>>,
    pub f: u32,
    pub is_public: bool,
    pub accepts_workflows: bool,
}

impl From<&Don> for DonWire {
    fn from(don: &Don) -> Self {
        Self {
            id: don.id,
            config_version: don.config_version,
            members: don.members.iter().map(|m| m.0.to_vec()).collect(),
            f: u32::from(don.f),
            is_public: don.is_public,
            accepts_workflows: don.accepts_workflows,
        }
    }
}

impl TryFrom<DonWire> for Don {
    type Error = CapabilityError;

    fn try_from(wire: DonWire) -> Result<Self, Self::Error> {
        let f = u8::try_from(wire.f).map_err(|_| {
            CapabilityError::public_user(
                ErrorCode::OutOfRange,
                format!("DON {} fault threshold {} exceeds 255", wire.id, wire.f),
            )
        })?;
        let members = wire
            .members
            .iter()
            .map(|m| PeerId::from_slice(m))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: wire.id,
            config_version: wire.config_version,
            members,
            f,
            is_public: wire.is_public,
            accepts_workflows: wire.accepts_workflows,
        })
    }
}

/// Transport form of [`Node`]; an absent peer id is an empty vector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeWire {
    pub peer_id: Vec<u8>,
    pub workflow_don: DonWire,
    pub capability_dons: Vec<DonWire>,
}

impl From<&Node> for NodeWire {
    fn from(node: &Node) -> Self {
        Self {
            peer_id: node.peer_id.map(|p| p.0.to_vec()).unwrap_or_default(),
            workflow_don: DonWire::from(&node.workflow_don),
            capability_dons: node.capability_dons.iter().map(DonWire::from).collect(),
        }
    }
}

impl TryFrom<NodeWire> for Node {
    type Error = CapabilityError;

    fn try_from(wire: NodeWire) -> Result<Self, Self::Error> {
        let peer_id = if wire.peer_id.is_empty() {
            None
        } else {
            Some(PeerId::from_slice(&wire.peer_id)?)
        };

        Ok(Self {
            peer_id,
            workflow_don: Don::try_from(wire.workflow_don)?,
            capability_dons: wire
                .capability_dons
                .into_iter()
                .map(Don::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}
