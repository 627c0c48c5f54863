//! # Capability Configuration
//!
//! Each capability is configured per DON. A configuration carries the
//! default request config map plus exactly one remote-access section
//! matching the capability type. Zero-valued numeric fields mean "unset"
//! and are filled by `apply_defaults`.

use serde::{Deserialize, Serialize};
use shared_types::{CapabilityType, ValueMap};
use std::time::Duration;

pub const DEFAULT_REGISTRATION_REFRESH: Duration = Duration::from_secs(30);
pub const DEFAULT_REGISTRATION_EXPIRY: Duration = Duration::from_secs(120);
pub const DEFAULT_MESSAGE_EXPIRY: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 100;
pub const DEFAULT_BATCH_COLLECTION_PERIOD: Duration = Duration::from_millis(100);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SERVER_MAX_PARALLEL_REQUESTS: u32 = 1000;

/// How a remote trigger is subscribed to and how its events are batched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTriggerConfig {
    pub registration_refresh: Duration,
    pub registration_expiry: Duration,
    /// Identical responses required before an event is forwarded.
    pub min_responses_to_aggregate: u32,
    pub message_expiry: Duration,
    pub max_batch_size: u32,
    pub batch_collection_period: Duration,
}

impl RemoteTriggerConfig {
    pub fn apply_defaults(&mut self) {
        fill(&mut self.registration_refresh, DEFAULT_REGISTRATION_REFRESH);
        fill(&mut self.registration_expiry, DEFAULT_REGISTRATION_EXPIRY);
        fill(&mut self.message_expiry, DEFAULT_MESSAGE_EXPIRY);
        fill(&mut self.batch_collection_period, DEFAULT_BATCH_COLLECTION_PERIOD);
        if self.max_batch_size == 0 {
            self.max_batch_size = DEFAULT_MAX_BATCH_SIZE;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTargetConfig {
    /// Request attributes left out when hashing requests for deduplication.
    pub request_hash_excluded_attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionSchedule {
    #[default]
    AllAtOnce,
    OneAtATime,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteExecutableConfig {
    pub request_timeout: Duration,
    pub server_max_parallel_requests: u32,
    /// Delay between successive transmissions under `OneAtATime`.
    pub delta_stage: Duration,
    pub transmission_schedule: TransmissionSchedule,
    pub request_hash_excluded_attributes: Vec<String>,
}

impl RemoteExecutableConfig {
    pub fn apply_defaults(&mut self) {
        fill(&mut self.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        if self.server_max_parallel_requests == 0 {
            self.server_max_parallel_requests = DEFAULT_SERVER_MAX_PARALLEL_REQUESTS;
        }
    }
}

/// The remote-access section; exactly one per configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config", rename_all = "snake_case")]
pub enum RemoteConfig {
    Trigger(RemoteTriggerConfig),
    Target(RemoteTargetConfig),
    Executable(RemoteExecutableConfig),
}

impl RemoteConfig {
    /// Section used for a capability type when nothing was configured.
    ///
    /// Combined capabilities are invoked like executables.
    pub fn for_type(capability_type: CapabilityType) -> Option<Self> {
        match capability_type {
            CapabilityType::Trigger => Some(Self::Trigger(RemoteTriggerConfig::default())),
            CapabilityType::Target => Some(Self::Target(RemoteTargetConfig::default())),
            CapabilityType::Action | CapabilityType::Consensus | CapabilityType::Combined => {
                Some(Self::Executable(RemoteExecutableConfig::default()))
            }
            CapabilityType::Unknown => None,
        }
    }

    pub fn apply_defaults(&mut self) {
        match self {
            Self::Trigger(config) => config.apply_defaults(),
            Self::Target(_) => {}
            Self::Executable(config) => config.apply_defaults(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityConfiguration {
    /// Merged under every request's own config.
    #[serde(default)]
    pub default_config: ValueMap,
    pub remote: RemoteConfig,
}

impl CapabilityConfiguration {
    pub fn new(remote: RemoteConfig) -> Self {
        Self {
            default_config: ValueMap::new(),
            remote,
        }
    }

    /// Fill unset numeric fields. `quorum` is the `f + 1` of the hosting
    /// DON, used for `min_responses_to_aggregate` when known.
    pub fn apply_defaults(&mut self, quorum: Option<u32>) {
        self.remote.apply_defaults();
        if let (RemoteConfig::Trigger(trigger), Some(quorum)) = (&mut self.remote, quorum) {
            if trigger.min_responses_to_aggregate == 0 {
                trigger.min_responses_to_aggregate = quorum;
            }
        }
    }
}

fn fill(value: &mut Duration, default: Duration) {
    if value.is_zero() {
        *value = default;
    }
}
