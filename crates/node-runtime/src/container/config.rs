//! # Node Configuration
//!
//! Loaded from an optional TOML file named by `CM_CONFIG`, then patched by
//! environment overrides:
//!
//! | Variable                | Field                            |
//! |-------------------------|----------------------------------|
//! | `CM_REGISTRY_ADDR`      | `registry.listen_addr`           |
//! | `CM_STORE_PATH`         | `delivery.store_path`            |
//! | `CM_RETRANSMIT_MS`      | `delivery.retransmit_interval_ms`|
//! | `CM_MAX_EVENT_AGE_SECS` | `delivery.max_event_age_secs`    |
//! | `CM_PEER_ID`            | `node.peer_id`                   |
//!
//! Every section is optional; missing fields take their defaults.

use cm_01_reliable_delivery::{DeliveryConfig, DEFAULT_MAX_EVENT_AGE, DEFAULT_RETRANSMIT_INTERVAL};
use cm_02_rpc_bridge::{BrokerConfig, BrokerTransport, ServerOptions};
use serde::{Deserialize, Serialize};
use shared_types::{Don, Node, PeerId};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_VAR: &str = "CM_CONFIG";

const DEFAULT_REGISTRY_PORT: u16 = 7700;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidOverride {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub registry: RegistrySection,
    pub delivery: DeliverySection,
    pub heartbeat: HeartbeatSection,
}

/// Identity and topology of this node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub peer_id: Option<PeerId>,
    pub workflow_don: Don,
    pub capability_dons: Vec<Don>,
    /// DONs this node is not a member of but resolves peers against.
    pub known_dons: Vec<Don>,
}

impl NodeSection {
    pub fn local_node(&self) -> Node {
        Node {
            peer_id: self.peer_id,
            workflow_don: self.workflow_don.clone(),
            capability_dons: self.capability_dons.clone(),
        }
    }
}

/// Registry RPC listener and capability endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Address the registry RPC service listens on.
    pub listen_addr: SocketAddr,
    /// How capability endpoints are published.
    pub broker_transport: BrokerTransport,
    /// Interface TCP capability endpoints bind to.
    pub bind_host: IpAddr,
    /// Redact private error messages on published capabilities.
    pub redact_private_errors: bool,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_REGISTRY_PORT),
            broker_transport: BrokerTransport::Tcp,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            redact_private_errors: false,
        }
    }
}

impl RegistrySection {
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            transport: self.broker_transport,
            bind_host: self.bind_host,
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            redact_private_errors: self.redact_private_errors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Rocksdb,
}

/// Reliable delivery timings and the pending-event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    pub retransmit_interval_ms: u64,
    pub max_event_age_secs: u64,
    pub store: StoreBackend,
    /// RocksDB directory; ignored by the memory backend.
    pub store_path: PathBuf,
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            retransmit_interval_ms: DEFAULT_RETRANSMIT_INTERVAL.as_millis() as u64,
            max_event_age_secs: DEFAULT_MAX_EVENT_AGE.as_secs(),
            store: StoreBackend::Memory,
            store_path: PathBuf::from("./data/events"),
        }
    }
}

impl DeliverySection {
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            retransmit_interval: Duration::from_millis(self.retransmit_interval_ms),
            max_age: Duration::from_secs(self.max_event_age_secs),
        }
    }
}

/// Built-in heartbeat trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSection {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl HeartbeatSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl NodeConfig {
    /// Load from `CM_CONFIG` (if set) and the process environment, then
    /// validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Like [`Self::load`], reading variables through `lookup`.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides on top of the loaded values.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("CM_REGISTRY_ADDR") {
            self.registry.listen_addr = parse_var("CM_REGISTRY_ADDR", &value)?;
        }
        if let Some(value) = lookup("CM_STORE_PATH") {
            self.delivery.store_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("CM_RETRANSMIT_MS") {
            self.delivery.retransmit_interval_ms = parse_var("CM_RETRANSMIT_MS", &value)?;
        }
        if let Some(value) = lookup("CM_MAX_EVENT_AGE_SECS") {
            self.delivery.max_event_age_secs = parse_var("CM_MAX_EVENT_AGE_SECS", &value)?;
        }
        if let Some(value) = lookup("CM_PEER_ID") {
            self.node.peer_id = Some(parse_var("CM_PEER_ID", &value)?);
        }
        Ok(())
    }

    /// Reject zero intervals, inverted delivery timings and DONs that
    /// break the membership bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery.retransmit_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery.retransmit_interval_ms must be positive".into(),
            ));
        }
        self.delivery
            .delivery_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.heartbeat.enabled && self.heartbeat.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat.interval_ms must be positive".into(),
            ));
        }

        let dons = std::iter::once(&self.node.workflow_don)
            .chain(&self.node.capability_dons)
            .chain(&self.node.known_dons);
        for don in dons {
            don.validate()
                .map_err(|e| ConfigError::Invalid(e.message().to_string()))?;
        }

        if self.delivery.store == StoreBackend::Rocksdb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::Invalid(
                "delivery.store = \"rocksdb\" requires the rocksdb feature".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidOverride {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
