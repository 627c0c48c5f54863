//! # Capability Mesh Node
//!
//! Entry point of a capability-mesh node.
//!
//! ## Startup Sequence
//!
//! 1. Initialise logging from `CM_LOG_LEVEL` / `RUST_LOG` / `CM_JSON_LOGS`
//! 2. Load configuration (`CM_CONFIG` TOML file plus env overrides)
//! 3. Build and start the runtime (delivery engine, registry, heartbeat)
//! 4. Wait for Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use cm_telemetry::{init_logging, TelemetryConfig};
use node_runtime::{NodeConfig, NodeRuntime};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_logging(&telemetry).context("failed to initialise logging")?;

    let config = NodeConfig::load().context("failed to load node configuration")?;
    info!(
        service = %telemetry.service_name,
        peer_id = ?config.node.peer_id,
        "Starting capability mesh node"
    );

    let runtime = NodeRuntime::new(config).context("failed to build node components")?;
    let addr = runtime.start().await.context("failed to start node")?;

    info!(registry = %addr, "Node is running. Press Ctrl+C to stop.");
    let signal = tokio::signal::ctrl_c().await;

    runtime.shutdown().await;
    signal.context("failed to listen for Ctrl+C")?;
    Ok(())
}
