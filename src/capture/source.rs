// src/capture/source.rs
//! Host-facing contracts of the capture state machine
//!
//! The simulation implements [`TrailSource`] so the recorder can read the
//! current actor state once per tick; the transport implements
//! [`SessionSink`] so the recorder can hand off closed sessions without
//! knowing how they travel.

use crate::capture::appearance::{Appearance, Vec2};
use crate::capture::session::{RoomKey, Session};

/// Stable host-side identity of an accessory object (arena index, entity id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessoryId(pub u64);

/// Current state of the main actor
#[derive(Debug, Clone)]
pub struct PrimaryState {
    pub position: Vec2,
    pub appearance: Appearance,
    /// Packed RGBA accent color (hair, outline, team color)
    pub color: u32,
    pub aux: Vec2,
}

/// Current state of one accessory object
#[derive(Debug, Clone)]
pub struct AccessoryState {
    pub id: AccessoryId,
    pub position: Vec2,
    pub appearance: Appearance,
}

/// Per-tick view of the simulation
pub trait TrailSource {
    /// Map and room the main actor is in
    fn room_key(&self) -> RoomKey;

    /// Main actor state
    fn primary(&self) -> PrimaryState;

    /// Every accessory object present this tick
    fn accessories(&self) -> Vec<AccessoryState>;
}

/// Destination of closed sessions
pub trait SessionSink {
    /// Whether a consumer is attached; capture is inert while false
    fn is_connected(&self) -> bool;

    /// Hand off a closed session. Returns false when it was dropped.
    fn enqueue(&self, session: Session) -> bool;
}

impl<S: SessionSink + ?Sized> SessionSink for std::sync::Arc<S> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn enqueue(&self, session: Session) -> bool {
        (**self).enqueue(session)
    }
}
