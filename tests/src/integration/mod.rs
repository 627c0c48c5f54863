//! # Integration Flows
//!
//! - `trigger_flow`: node heartbeat → delivery engine → bridge → remote
//!   subscriber, with acknowledgement and stream termination
//! - `recovery`: pending events survive an engine restart
//! - `redaction`: error taxonomy across node boundaries

pub mod recovery;
pub mod redaction;
pub mod trigger_flow;
