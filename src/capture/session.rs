// src/capture/session.rs
//! Sessions, tracks and frames
//!
//! A [`Session`] is one self-contained capture batch for a single
//! (map, room) visit. While open it is owned by the recorder; once closed it
//! is moved into the outbound queue and later into the consumer callback.

use crate::capture::appearance::Vec2;
use crate::capture::registry::AppearanceRegistry;
use crate::transport::codec::WireSchema;
use crate::utils::errors::{Result, TrailError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// A timestamped sample stored in a [`Track`]
pub trait TrackFrame {
    /// Seconds since the session opened
    fn timestamp(&self) -> f64;

    /// Appearance id referenced by this frame
    fn appearance(&self) -> u32;

    /// Whether `other` would render identically (delta-compression key)
    fn is_equivalent(&self, other: &Self) -> bool;

    /// No NaN or infinite coordinates; such a frame cannot travel
    fn is_finite(&self) -> bool;
}

/// Sample of the session's main actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryFrame {
    pub t: f64,
    pub pos: Vec2,
    pub appearance: u32,
    pub color: u32,
    /// Auxiliary point, e.g. a trailing attachment
    pub aux: Vec2,
}

impl TrackFrame for PrimaryFrame {
    fn timestamp(&self) -> f64 {
        self.t
    }

    fn appearance(&self) -> u32 {
        self.appearance
    }

    fn is_equivalent(&self, other: &Self) -> bool {
        self.pos == other.pos && self.appearance == other.appearance && self.color == other.color
    }

    fn is_finite(&self) -> bool {
        self.t.is_finite() && self.pos.is_finite() && self.aux.is_finite()
    }
}

/// Sample of an accessory object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryFrame {
    pub t: f64,
    pub appearance: u32,
    pub pos: Vec2,
}

impl TrackFrame for SecondaryFrame {
    fn timestamp(&self) -> f64 {
        self.t
    }

    fn appearance(&self) -> u32 {
        self.appearance
    }

    fn is_equivalent(&self, other: &Self) -> bool {
        self.pos == other.pos && self.appearance == other.appearance
    }

    fn is_finite(&self) -> bool {
        self.t.is_finite() && self.pos.is_finite()
    }
}

/// Append-only, timestamp-ordered frame history of one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Track<F> {
    frames: Vec<F>,
}

impl<F: TrackFrame> Track<F> {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Append `frame` unless it is non-finite, repeats the last frame or
    /// goes back in time.
    ///
    /// Returns whether the frame was stored.
    pub fn push(&mut self, frame: F) -> bool {
        if !frame.is_finite() {
            trace!("Rejecting non-finite frame at {}", frame.timestamp());
            return false;
        }
        if let Some(last) = self.frames.last() {
            if frame.timestamp() < last.timestamp() {
                trace!(
                    "Rejecting out-of-order frame ({} < {})",
                    frame.timestamp(),
                    last.timestamp()
                );
                return false;
            }
            if last.is_equivalent(&frame) {
                return false;
            }
        }
        self.frames.push(frame);
        true
    }

    pub fn frames(&self) -> &[F] {
        &self.frames
    }

    pub fn last(&self) -> Option<&F> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn check_order(&self) -> Result<()> {
        for pair in self.frames.windows(2) {
            if pair[1].timestamp() < pair[0].timestamp() {
                return Err(TrailError::Decode(format!(
                    "frame at t={} precedes t={}",
                    pair[1].timestamp(),
                    pair[0].timestamp()
                )));
            }
        }
        Ok(())
    }
}

impl<F: TrackFrame> Default for Track<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> From<Vec<F>> for Track<F> {
    fn from(frames: Vec<F>) -> Self {
        Self { frames }
    }
}

/// (map, room) pair a session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub map: String,
    pub room: String,
}

impl RoomKey {
    pub fn new(map: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            room: room.into(),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.map, self.room)
    }
}

/// One closed capture batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Map identifier
    pub map: String,

    /// Room identifier
    pub room: String,

    /// Every appearance referenced by the tracks below
    pub registry: AppearanceRegistry,

    /// Track of the main actor
    pub primary: Track<PrimaryFrame>,

    /// One track per accessory object seen during the session
    pub secondary: Vec<Track<SecondaryFrame>>,
}

impl Session {
    /// Create an empty session bound to `key`
    pub fn new(key: &RoomKey) -> Self {
        Self {
            map: key.map.clone(),
            room: key.room.clone(),
            registry: AppearanceRegistry::new(),
            primary: Track::new(),
            secondary: Vec::new(),
        }
    }

    pub fn key(&self) -> RoomKey {
        RoomKey::new(self.map.clone(), self.room.clone())
    }

    /// Total frames across all tracks
    pub fn frame_count(&self) -> usize {
        self.primary.len() + self.secondary.iter().map(Track::len).sum::<usize>()
    }

    /// Check that every float is finite, frames are ordered and every
    /// appearance id resolves
    pub fn validate(&self) -> Result<()> {
        for (id, appearance) in self.registry.snapshot() {
            if !appearance.is_finite() {
                return Err(TrailError::InvalidRegistry(format!(
                    "appearance {} ({}) has a non-finite field",
                    id, appearance.path
                )));
            }
        }

        self.check_track(&self.primary)?;
        for track in &self.secondary {
            self.check_track(track)?;
        }
        Ok(())
    }

    fn check_track<F: TrackFrame>(&self, track: &Track<F>) -> Result<()> {
        track.check_order()?;
        for frame in track.frames() {
            if !frame.is_finite() {
                return Err(TrailError::Decode(format!(
                    "frame at t={} has a non-finite coordinate",
                    frame.timestamp()
                )));
            }
            let id = frame.appearance();
            if !self.registry.contains(id) {
                return Err(TrailError::UnknownAppearance { id });
            }
        }
        Ok(())
    }
}

impl WireSchema for Session {
    const SCHEMA: &'static str = "trail-session.v1";

    fn validate(&self) -> Result<()> {
        Session::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::appearance::Appearance;
    use proptest::prelude::*;

    fn primary(t: f64, x: f32, appearance: u32) -> PrimaryFrame {
        PrimaryFrame {
            t,
            pos: Vec2::new(x, 0.0),
            appearance,
            color: 0xAC32_32FF,
            aux: Vec2::new(x - 4.0, -8.0),
        }
    }

    #[test]
    fn test_push_elides_equivalent() {
        let mut track = Track::new();
        assert!(track.push(primary(0.0, 1.0, 1)));
        assert!(!track.push(primary(0.133, 1.0, 1)));
        assert!(track.push(primary(0.266, 2.0, 1)));
        assert!(track.push(primary(0.399, 2.0, 2)));
        assert_eq!(track.len(), 3);
    }

    #[test]
    fn test_aux_does_not_affect_equivalence() {
        let mut track = Track::new();
        track.push(primary(0.0, 1.0, 1));
        let mut moved_aux = primary(0.1, 1.0, 1);
        moved_aux.aux = Vec2::new(100.0, 100.0);
        assert!(!track.push(moved_aux));
    }

    #[test]
    fn test_color_change_is_recorded() {
        let mut track = Track::new();
        track.push(primary(0.0, 1.0, 1));
        let mut dashed = primary(0.1, 1.0, 1);
        dashed.color = 0x44B7_FFFF;
        assert!(track.push(dashed));
    }

    #[test]
    fn test_push_rejects_out_of_order() {
        let mut track = Track::new();
        track.push(primary(1.0, 1.0, 1));
        assert!(!track.push(primary(0.5, 2.0, 1)));
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_push_rejects_non_finite() {
        let mut track = Track::new();
        assert!(!track.push(primary(0.0, f32::NAN, 1)));
        assert!(track.push(primary(0.1, 1.0, 1)));

        let mut bad_aux = primary(0.2, 2.0, 1);
        bad_aux.aux = Vec2::new(f32::INFINITY, 0.0);
        assert!(!track.push(bad_aux));
        assert!(!track.push(primary(f64::NAN, 3.0, 1)));
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_validate_rejects_non_finite_values() {
        let key = RoomKey::new("Celeste/1-ForsakenCity", "a-00");
        let mut session = Session::new(&key);
        let id = session.registry.intern(&Appearance::new("player/idle00")).unwrap();
        session.primary = Track::from(vec![primary(0.0, f32::NAN, id)]);
        assert!(matches!(session.validate(), Err(TrailError::Decode(_))));

        let mut session = Session::new(&key);
        let id = session
            .registry
            .intern(&Appearance::new("player/spin00").with_rotation(f32::INFINITY))
            .unwrap();
        session.primary.push(primary(0.0, 0.0, id));
        assert!(matches!(
            session.validate(),
            Err(TrailError::InvalidRegistry(_))
        ));
    }

    #[test]
    fn test_validate_unknown_appearance() {
        let key = RoomKey::new("Celeste/1-ForsakenCity", "a-00");
        let mut session = Session::new(&key);
        let id = session.registry.intern(&Appearance::new("player/idle00")).unwrap();
        session.primary.push(primary(0.0, 0.0, id));
        assert!(session.validate().is_ok());

        session.secondary.push(Track::from(vec![SecondaryFrame {
            t: 0.0,
            appearance: id + 5,
            pos: Vec2::ZERO,
        }]));
        assert!(matches!(
            session.validate(),
            Err(TrailError::UnknownAppearance { .. })
        ));
    }

    #[test]
    fn test_frame_count_and_key() {
        let key = RoomKey::new("map", "room");
        let mut session = Session::new(&key);
        session.primary.push(primary(0.0, 0.0, 1));
        session.secondary.push(Track::from(vec![
            SecondaryFrame { t: 0.0, appearance: 1, pos: Vec2::ZERO },
            SecondaryFrame { t: 0.1, appearance: 1, pos: Vec2::ONE },
        ]));
        assert_eq!(session.frame_count(), 3);
        assert_eq!(session.key(), key);
        assert_eq!(key.to_string(), "map/room");
    }

    proptest! {
        #[test]
        fn prop_equal_frames_collapse(count in 1usize..200, x in -1000.0f32..1000.0) {
            let mut track = Track::new();
            for i in 0..count {
                track.push(primary(i as f64 * 0.133, x, 3));
            }
            prop_assert_eq!(track.len(), 1);
        }

        #[test]
        fn prop_no_adjacent_equivalent(xs in proptest::collection::vec(0u8..3, 1..100)) {
            let mut track = Track::new();
            for (i, x) in xs.iter().enumerate() {
                track.push(primary(i as f64, *x as f32, 1));
            }
            for pair in track.frames().windows(2) {
                prop_assert!(!pair[0].is_equivalent(&pair[1]));
                prop_assert!(pair[0].t <= pair[1].t);
            }
        }
    }
}
