//! # Capability Mesh Telemetry
//!
//! - **Logging**: `init_logging` installs a `tracing-subscriber` fmt
//!   subscriber (plain or JSON) filtered by `EnvFilter`.
//! - **Metrics**: `PrometheusMetrics` implements the
//!   [`MetricsSink`](shared_types::MetricsSink) port on a registry it owns.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! let metrics = PrometheusMetrics::shared();
//! let engine = ReliableDeliveryEngine::builder(store).metrics(metrics.clone()).build()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CM_SERVICE_NAME` | `capability-mesh` | Service name in logs |
//! | `CM_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `CM_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::PrometheusMetrics;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
