// src/utils/mod.rs
//! Common utilities: error types and configuration loading

pub mod config;
pub mod errors;

pub use config::{CaptureConfig, ObservabilityConfig, TrailConfig, TransportConfig};
pub use errors::{Result, TrailError};
