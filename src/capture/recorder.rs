// src/capture/recorder.rs
//! Trail capture state machine
//!
//! Driven once per simulation tick. While a consumer is attached it keeps
//! one open [`Session`] per (map, room) visit, samples the main actor and
//! every accessory object at a fixed cadence, and hands closed sessions to a
//! [`SessionSink`].
//!
//! ```text
//!            tick (connected)                 key change / death / shutdown
//!   Idle ─────────────────────────▶ Recording ───────────────────────────▶ Flushing
//!    ▲                                  ▲                                     │
//!    │          shutdown                │          next tick, same tick       │
//!    └──────────────────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! No I/O happens here; the only blocking point is the sink's bounded
//! enqueue when a session closes.

use crate::capture::appearance::Appearance;
use crate::capture::session::{PrimaryFrame, RoomKey, SecondaryFrame, Session, Track};
use crate::capture::source::{AccessoryId, SessionSink, TrailSource};
use crate::utils::config::CaptureConfig;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Time between two samples
    pub sample_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(133),
        }
    }
}

impl From<&CaptureConfig> for RecorderConfig {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            sample_interval: config.sample_interval(),
        }
    }
}

/// Observable recorder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No open session
    Idle,

    /// A session is open and accumulating frames
    Recording,
}

/// Recorder counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_handed_off: u64,
    pub sessions_refused: u64,
    pub samples_taken: u64,
    pub frames_recorded: u64,
    pub frames_elided: u64,
    /// Samples with a NaN or infinite value, or no appearance id left to mint
    pub frames_rejected: u64,
}

/// Secondary track bound to one accessory for the life of a session
struct Binding {
    /// First-sight order, keeps the merged list stable
    order: u64,
    track: Track<SecondaryFrame>,
}

/// Session under construction plus its sampling clock
struct OpenSession {
    key: RoomKey,
    session: Session,
    bindings: HashMap<AccessoryId, Binding>,
    next_order: u64,
    elapsed: Duration,
    accumulator: Duration,
}

impl OpenSession {
    fn new(key: RoomKey, interval: Duration) -> Self {
        let session = Session::new(&key);
        Self {
            key,
            session,
            bindings: HashMap::new(),
            next_order: 0,
            elapsed: Duration::ZERO,
            // Primed so the opening tick samples at t = 0
            accumulator: interval,
        }
    }

    /// Merge bound tracks into the session and give it up
    fn finish(mut self) -> Session {
        let mut bound: Vec<Binding> = self.bindings.into_values().collect();
        bound.sort_by_key(|binding| binding.order);
        self.session
            .secondary
            .extend(bound.into_iter().map(|binding| binding.track));
        self.session
    }
}

/// Per-tick trail capture driver
pub struct TrailRecorder<S: SessionSink> {
    config: RecorderConfig,
    sink: S,
    open: Option<OpenSession>,
    pending_termination: bool,
    stats: RecorderStats,
}

impl<S: SessionSink> TrailRecorder<S> {
    /// Create a recorder handing sessions to `sink`
    pub fn new(config: RecorderConfig, sink: S) -> Self {
        info!(
            "Trail recorder sampling every {:?}",
            config.sample_interval
        );
        Self {
            config,
            sink,
            open: None,
            pending_termination: false,
            stats: RecorderStats::default(),
        }
    }

    /// Advance by one simulation tick that took `delta` of real time
    pub fn tick<T: TrailSource + ?Sized>(&mut self, source: &T, delta: Duration) {
        if !self.sink.is_connected() {
            return;
        }

        let key = source.room_key();
        let stale = self
            .open
            .as_ref()
            .map_or(false, |open| open.key != key || self.pending_termination);
        if stale {
            self.close_session();
        }
        self.pending_termination = false;

        let interval = self.config.sample_interval;
        if let Some(open) = self.open.as_mut() {
            // A host clock glitch must not overflow the session clock
            open.elapsed = open.elapsed.saturating_add(delta);
            open.accumulator = open.accumulator.saturating_add(delta);
        } else {
            debug!("Opening trail session for {}", key);
            self.stats.sessions_opened += 1;
            self.open = Some(OpenSession::new(key, interval));
        }

        let Some(open) = self.open.as_mut() else {
            return;
        };
        if open.accumulator >= interval {
            // At most one sample per tick; a long stall leaves one catch-up sample at most
            open.accumulator = (open.accumulator - interval).min(interval);
            Self::sample(open, source, &mut self.stats);
        }
    }

    /// Close the open session on the next connected tick
    pub fn notify_death(&mut self) {
        self.pending_termination = true;
    }

    /// Forget an accessory object the host destroyed; its unmerged track is discarded
    pub fn release_accessory(&mut self, id: AccessoryId) {
        if let Some(open) = self.open.as_mut() {
            if open.bindings.remove(&id).is_some() {
                debug!("Released accessory {:?}", id);
            }
        }
    }

    /// Close and hand off any open session, leaving the recorder idle
    pub fn shutdown(&mut self) {
        if self.open.is_some() {
            info!("Flushing open trail session on shutdown");
            self.close_session();
        }
        self.pending_termination = false;
    }

    pub fn state(&self) -> RecorderState {
        if self.open.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Session being recorded, without its not-yet-merged accessory tracks
    pub fn current_session(&self) -> Option<&Session> {
        self.open.as_ref().map(|open| &open.session)
    }

    /// Number of accessories currently bound to a track
    pub fn bound_accessories(&self) -> usize {
        self.open.as_ref().map_or(0, |open| open.bindings.len())
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn close_session(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };

        let key = open.key.clone();
        let session = open.finish();
        self.stats.sessions_closed += 1;
        debug!(
            "Closing trail session for {} ({} frames, {} secondary tracks)",
            key,
            session.frame_count(),
            session.secondary.len()
        );

        if self.sink.enqueue(session) {
            self.stats.sessions_handed_off += 1;
        } else {
            self.stats.sessions_refused += 1;
            warn!("Trail session for {} was dropped by the sink", key);
        }
    }

    fn sample<T: TrailSource + ?Sized>(open: &mut OpenSession, source: &T, stats: &mut RecorderStats) {
        let t = open.elapsed.as_secs_f64();
        stats.samples_taken += 1;

        let primary = source.primary();
        let usable = primary.position.is_finite() && primary.aux.is_finite();
        match Self::appearance_id(&open.session, &primary.appearance, usable) {
            Some(appearance) => {
                let frame = PrimaryFrame {
                    t,
                    pos: primary.position,
                    appearance,
                    color: primary.color,
                    aux: primary.aux,
                };
                Self::count(stats, open.session.primary.push(frame));
            }
            None => stats.frames_rejected += 1,
        }

        for accessory in source.accessories() {
            let usable = accessory.position.is_finite();
            let Some(appearance) =
                Self::appearance_id(&open.session, &accessory.appearance, usable)
            else {
                stats.frames_rejected += 1;
                continue;
            };
            let next_order = &mut open.next_order;
            let binding = open.bindings.entry(accessory.id).or_insert_with(|| {
                let order = *next_order;
                *next_order += 1;
                Binding {
                    order,
                    track: Track::new(),
                }
            });
            let frame = SecondaryFrame {
                t,
                appearance,
                pos: accessory.position,
            };
            Self::count(stats, binding.track.push(frame));
        }
    }

    /// Intern `appearance` for a sample whose coordinates were `usable`
    fn appearance_id(session: &Session, appearance: &Appearance, usable: bool) -> Option<u32> {
        if !usable || !appearance.is_finite() {
            debug!("Skipping non-finite sample of {}", appearance.path);
            return None;
        }
        match session.registry.intern(appearance) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Cannot intern {}: {}", appearance.path, e);
                None
            }
        }
    }

    fn count(stats: &mut RecorderStats, recorded: bool) {
        if recorded {
            stats.frames_recorded += 1;
        } else {
            stats.frames_elided += 1;
        }
    }
}
