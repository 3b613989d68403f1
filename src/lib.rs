// src/lib.rs
//! Trail Link Library
//!
//! Streams a moving actor's recent trajectory from a live simulation to a
//! separate visualizer process over a host-local socket.
//!
//! # Architecture
//!
//! The crate is structured into these modules:
//!
//! - **capture**: per-tick trail sampling, delta-compression and appearance interning
//! - **transport**: record codec, bounded outbound queue, send and receive loops
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trail_link::{OutboundChannel, RecorderConfig, Session, TrailConfig, TrailRecorder};
//!
//! # async fn wire() -> trail_link::Result<()> {
//! let config = TrailConfig::load()?;
//! let channel = Arc::new(OutboundChannel::<Session>::new(config.transport.clone()));
//! channel.start()?;
//!
//! let recorder = TrailRecorder::new(RecorderConfig::from(&config.capture), Arc::clone(&channel));
//! // once per simulation tick:
//! // recorder.tick(&world, delta);
//! # drop(recorder);
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod capture;
pub mod observability;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use capture::{
    AccessoryId, AccessoryState, Appearance, AppearanceRegistry, PrimaryFrame, PrimaryState,
    RecorderConfig, RecorderState, RecorderStats, RoomKey, SecondaryFrame, Session, SessionSink,
    Track, TrailRecorder, TrailSource, Vec2,
};
pub use transport::{InboundChannel, OutboundChannel, WireSchema};
pub use utils::config::TrailConfig;
pub use utils::errors::{Result, TrailError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_session_schema_name() {
        assert_eq!(<Session as WireSchema>::SCHEMA, "trail-session.v1");
    }
}
