//! # Domain Layer
//!
//! Pending-event bookkeeping for the reliable delivery engine. No I/O.
//!
//! ## Modules
//!
//! - `entities` - `PendingEvent` and its composite `EventKey`
//! - `value_objects` - `DeliveryConfig`
//! - `errors` - `StoreError`, `DeliveryError`

pub mod entities;
pub mod errors;
pub mod value_objects;
