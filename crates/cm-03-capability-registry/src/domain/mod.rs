//! # Domain Layer
//!
//! - `config` - per-capability configuration and its defaults
//! - `errors` - `RegistryError`

pub mod config;
pub mod errors;
