// src/utils/config.rs
//! Layered configuration
//!
//! Values come from, in increasing priority:
//! 1. Built-in defaults
//! 2. An optional `trail.{toml,json,yaml}` file in the working directory
//! 3. `TRAIL__`-prefixed environment variables (`TRAIL__TRANSPORT__QUEUE_CAPACITY=20`)

use crate::utils::errors::{Result, TrailError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailConfig {
    /// Capture state machine settings
    pub capture: CaptureConfig,

    /// Socket transport settings
    pub transport: TransportConfig,

    /// Logging and metrics settings
    pub observability: ObservabilityConfig,
}

/// Capture state machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sampling interval in milliseconds
    pub sample_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 133,
        }
    }
}

impl CaptureConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Socket transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Directory holding the per-schema socket files
    pub socket_dir: PathBuf,

    /// Prefix of every endpoint name
    pub channel_prefix: String,

    /// Outbound queue capacity (closed sessions)
    pub queue_capacity: usize,

    /// Longest wait for a free queue slot before a session is dropped
    pub enqueue_timeout_ms: u64,

    /// Dequeue poll period of the send loop
    pub dequeue_poll_ms: u64,

    /// Pause between failed connect attempts
    pub reconnect_delay_ms: u64,

    /// Longest inbound line accepted
    pub max_record_bytes: usize,

    /// Number of encode buffers kept for reuse
    pub buffer_pool_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_dir: std::env::temp_dir(),
            channel_prefix: "trail-link".to_string(),
            queue_capacity: 10,
            enqueue_timeout_ms: 330,
            dequeue_poll_ms: 1000,
            reconnect_delay_ms: 250,
            max_record_bytes: 16 * 1024 * 1024,
            buffer_pool_size: 4,
        }
    }
}

impl TransportConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn dequeue_poll(&self) -> Duration {
        Duration::from_millis(self.dequeue_poll_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,

    /// Prometheus scrape address (e.g. "127.0.0.1:9464"); disabled when unset
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_addr: None,
        }
    }
}

impl TrailConfig {
    /// Load from the optional `trail.*` file and the environment
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("trail").required(false))
            .add_source(Self::environment())
            .build()?;

        Self::finish(settings)
    }

    /// Load from an explicit file, still honouring environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        Self::finish(settings)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("TRAIL")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(settings: config::Config) -> Result<Self> {
        let config: TrailConfig = settings.try_deserialize()?;
        config.validate()?;
        debug!("Configuration resolved: {:?}", config);
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.capture.sample_interval_ms == 0 {
            return Err(TrailError::Config(
                "capture.sample_interval_ms must be positive".to_string(),
            ));
        }
        if self.transport.queue_capacity == 0 {
            return Err(TrailError::Config(
                "transport.queue_capacity must be positive".to_string(),
            ));
        }
        if self.transport.dequeue_poll_ms == 0 {
            return Err(TrailError::Config(
                "transport.dequeue_poll_ms must be positive".to_string(),
            ));
        }
        if self.transport.channel_prefix.is_empty() {
            return Err(TrailError::Config(
                "transport.channel_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
