//! # Service Layer
//!
//! - `engine` - `ReliableDeliveryEngine`
//! - `trigger` - `BaseTriggerCapability`, a trigger built on the engine

pub mod engine;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use engine::{DeliveryEngineBuilder, LostHook, ReliableDeliveryEngine};
pub use trigger::BaseTriggerCapability;
