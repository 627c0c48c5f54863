//! # Capability Mesh Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (bridge round trips, delivery)
//! └── src/
//!     ├── fixtures.rs   # Test capabilities and helpers
//!     └── integration/  # Cross-crate flows over real connections
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p cm-tests
//!
//! # With the durable event store
//! cargo test -p cm-tests --features rocksdb
//!
//! # Benchmarks
//! cargo bench -p cm-tests
//! ```

pub mod fixtures;
pub mod integration;
