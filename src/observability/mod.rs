// src/observability/mod.rs
//! Logging and metrics
//!
//! Tracing goes through `tracing-subscriber`; counters and gauges go through
//! the `metrics` facade and are only exported when a Prometheus address is
//! configured. Without an installed recorder every metric call is a no-op.

use crate::utils::config::ObservabilityConfig;
use crate::utils::errors::{Result, TrailError};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Metric names
pub mod names {
    pub const SESSIONS_ENQUEUED: &str = "trail_sessions_enqueued_total";
    pub const SESSIONS_DROPPED: &str = "trail_sessions_dropped_total";
    pub const SESSIONS_SENT: &str = "trail_sessions_sent_total";
    pub const SEND_FAILURES: &str = "trail_send_failures_total";
    pub const OUTBOUND_RECONNECTS: &str = "trail_outbound_reconnects_total";
    pub const INBOUND_RECONNECTS: &str = "trail_inbound_reconnects_total";
    pub const SESSIONS_RECEIVED: &str = "trail_sessions_received_total";
    pub const DECODE_FAULTS: &str = "trail_decode_faults_total";
    pub const QUEUE_DEPTH: &str = "trail_outbound_queue_depth";
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Calling this twice is harmless.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TrailError::Config(format!("Invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // Err means a subscriber is already set (tests, embedding host)
    if installed.is_ok() {
        info!("Tracing initialized (level: {})", config.log_level);
    }

    Ok(())
}

/// Install the Prometheus exporter when an address is configured.
///
/// Must be called from inside a tokio runtime.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(addr) = &config.metrics_addr else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| TrailError::Config(format!("Invalid metrics address '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TrailError::Config(format!("Failed to install metrics exporter: {}", e)))?;

    info!("Prometheus metrics exported on {}", addr);
    Ok(())
}
