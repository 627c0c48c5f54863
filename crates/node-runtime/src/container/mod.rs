//! # Component Container
//!
//! Node configuration and the components built from it.

pub mod components;
pub mod config;

pub use components::NodeComponents;
pub use config::{ConfigError, NodeConfig, StoreBackend};
