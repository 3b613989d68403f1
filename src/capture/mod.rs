// src/capture/mod.rs
//! Trail capture
//!
//! - **Appearance**: value-compared draw descriptors
//! - **Registry**: per-session interning of descriptors to small ids
//! - **Session**: sessions, tracks and delta-compressed frames
//! - **Source**: host contracts (`TrailSource`, `SessionSink`)
//! - **Recorder**: the per-tick state machine
//!
//! # Data flow
//!
//! ```text
//! tick(delta) → TrailRecorder ──sample──▶ open Session (+ AppearanceRegistry)
//!                    │
//!                    └── room change / death / shutdown ──▶ SessionSink::enqueue
//! ```

pub mod appearance;
pub mod recorder;
pub mod registry;
pub mod session;
pub mod source;

pub use appearance::{Appearance, Vec2};
pub use recorder::{RecorderConfig, RecorderState, RecorderStats, TrailRecorder};
pub use registry::AppearanceRegistry;
pub use session::{PrimaryFrame, RoomKey, SecondaryFrame, Session, Track, TrackFrame};
pub use source::{AccessoryId, AccessoryState, PrimaryState, SessionSink, TrailSource};
