//! Deterministic in-process playback engine.
//!
//! `SimulatedEngine` derives its state from a shared [`SimClock`] that the host advances
//! once per tick, so two engines on the same clock drift only by what their
//! [`SimProfile`]s say: clock skew, periodic stalls, or a finite duration.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::engine::PlaybackEngine;

/// Shared monotonic clock in microseconds.
#[derive(Clone, Debug, Default)]
pub struct SimClock {
    now_us: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Relaxed)
    }

    pub fn advance(&self, by: Duration) {
        let us = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.now_us.fetch_add(us, Ordering::Relaxed);
    }
}

/// Behaviour knobs for a simulated engine.
#[derive(Clone, Debug, PartialEq)]
pub struct SimProfile {
    /// Nominal frame rate of the media.
    pub fps: f64,
    /// Time from `prepare()` until the engine reports ready.
    pub prepare_latency: Duration,
    /// Playback clock error in parts per million (positive runs fast).
    pub skew_ppm: f64,
    /// Every N presented frames the engine holds one frame too long.
    pub stall_every: Option<u64>,
    /// Media length; playback ends on its own once reached.
    pub duration: Option<Duration>,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            fps: 30.0,
            prepare_latency: Duration::from_millis(250),
            skew_ppm: 0.0,
            stall_every: None,
            duration: None,
        }
    }
}

/// Playback engine simulated on top of a [`SimClock`].
#[derive(Debug)]
pub struct SimulatedEngine {
    name: String,
    clock: SimClock,
    profile: SimProfile,
    source: Option<String>,
    prepare_started_us: Option<u64>,
    play_started_us: Option<u64>,
}

impl SimulatedEngine {
    pub fn new(name: impl Into<String>, clock: SimClock, profile: SimProfile) -> Self {
        Self {
            name: name.into(),
            clock,
            profile,
            source: None,
            prepare_started_us: None,
            play_started_us: None,
        }
    }

    fn fps(&self) -> f64 {
        if self.profile.fps.is_finite() && self.profile.fps > 0.0 {
            self.profile.fps
        } else {
            SimProfile::default().fps
        }
    }

    /// Media time elapsed since `play()`, after skew and clamped to the duration.
    fn elapsed_media_secs(&self) -> Option<f64> {
        let start = self.play_started_us?;
        let wall = self.clock.now_us().saturating_sub(start) as f64 / 1_000_000.0;
        let mut media = wall * (1.0 + self.profile.skew_ppm / 1_000_000.0);
        if let Some(duration) = self.profile.duration {
            media = media.min(duration.as_secs_f64());
        }
        Some(media.max(0.0))
    }

    /// Presented `(time, frame)` with stalls applied to both.
    fn position(&self) -> (f64, u64) {
        let Some(media) = self.elapsed_media_secs() else {
            return (0.0, 0);
        };
        let fps = self.fps();
        let raw_frames = (media * fps).floor() as u64;
        let stalls = match self.profile.stall_every {
            Some(n) if n > 0 => raw_frames / n,
            _ => 0,
        };
        let time = (media - stalls as f64 / fps).max(0.0);
        (time, raw_frames - stalls)
    }

    fn reached_end(&self) -> bool {
        match (self.profile.duration, self.play_started_us) {
            (Some(duration), Some(_)) => self
                .elapsed_media_secs()
                .is_some_and(|media| media >= duration.as_secs_f64()),
            _ => false,
        }
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn set_source(&mut self, source: &str) {
        if source.is_empty() {
            tracing::debug!(engine = %self.name, "ignoring empty source");
            return;
        }
        self.source = Some(source.to_string());
        self.prepare_started_us = None;
        self.play_started_us = None;
    }

    fn prepare(&mut self) {
        if self.source.is_none() {
            tracing::debug!(engine = %self.name, "prepare without source ignored");
            return;
        }
        self.prepare_started_us = Some(self.clock.now_us());
    }

    fn is_ready(&self) -> bool {
        match (&self.source, self.prepare_started_us) {
            (Some(_), Some(started)) => {
                let waited = self.clock.now_us().saturating_sub(started);
                u128::from(waited) >= self.profile.prepare_latency.as_micros()
            }
            _ => false,
        }
    }

    fn play(&mut self) {
        if !self.is_ready() {
            tracing::debug!(engine = %self.name, "play before ready ignored");
            return;
        }
        if self.play_started_us.is_none() {
            self.play_started_us = Some(self.clock.now_us());
        }
    }

    fn stop(&mut self) {
        self.play_started_us = None;
        self.prepare_started_us = None;
    }

    fn is_playing(&self) -> bool {
        self.play_started_us.is_some() && !self.reached_end()
    }

    fn current_time(&self) -> f64 {
        self.position().0
    }

    fn current_frame(&self) -> u64 {
        self.position().1
    }
}
