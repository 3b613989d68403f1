// src/utils/errors.rs
//! Error types shared by capture, codec and transport

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, TrailError>;

/// Errors produced by the trail pipeline
#[derive(Debug, Error)]
pub enum TrailError {
    /// Transport I/O failure (bind, accept, connect, read, write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    
    /// A value could not be serialized into a wire record
    #[error("Encode failed: {0}")]
    Encode(String),
    
    /// A wire record was malformed
    #[error("Decode failed: {0}")]
    Decode(String),
    
    /// A frame referenced an appearance id missing from the record's registry
    #[error("Unknown appearance id {id}")]
    UnknownAppearance { id: u32 },
    
    /// A received registry is not a valid id/descriptor bijection
    #[error("Invalid registry: {0}")]
    InvalidRegistry(String),
    
    /// An inbound line exceeded the configured record ceiling
    #[error("Record exceeds {limit} bytes")]
    RecordTooLong { limit: usize },
    
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
    
    /// No async runtime available to host a background loop
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
    
    /// A background loop was started twice
    #[error("Channel is already running")]
    AlreadyRunning,
    
    /// A background loop was stopped without having been started
    #[error("Channel is not running")]
    NotRunning,
}

impl TrailError {
    /// Whether this error signals an incompatible peer rather than a transient fault.
    ///
    /// Protocol faults end the inbound read loop instead of triggering a reconnect.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            TrailError::Decode(_)
                | TrailError::UnknownAppearance { .. }
                | TrailError::InvalidRegistry(_)
                | TrailError::RecordTooLong { .. }
        )
    }
}

impl From<serde_json::Error> for TrailError {
    fn from(e: serde_json::Error) -> Self {
        TrailError::Decode(e.to_string())
    }
}

impl From<config::ConfigError> for TrailError {
    fn from(e: config::ConfigError) -> Self {
        TrailError::Config(e.to_string())
    }
}
