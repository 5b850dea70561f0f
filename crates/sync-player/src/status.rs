//! Read model over a sync session for status displays.

use dualsync_types::{Channel, ChannelStatus, DriftReport, SessionPhase, SyncStatus};

use crate::controller::PlaybackController;
use crate::engine::PlaybackEngine;

/// Borrowing, read-only view of a controller.
///
/// A detached reporter (no session yet) answers with idle/zero defaults.
pub struct StatusReporter<'a, E> {
    controller: Option<&'a PlaybackController<E>>,
}

impl<'a, E: PlaybackEngine> StatusReporter<'a, E> {
    pub fn new(controller: &'a PlaybackController<E>) -> Self {
        Self {
            controller: Some(controller),
        }
    }

    pub fn detached() -> Self {
        Self { controller: None }
    }

    pub fn current_phase(&self) -> SessionPhase {
        self.controller
            .map(|c| c.phase())
            .unwrap_or_default()
    }

    /// Max time divergence (seconds) of the current or last episode.
    pub fn max_divergence(&self) -> f64 {
        self.controller
            .map(|c| c.monitor().max_time_divergence())
            .unwrap_or(0.0)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.controller
            .map(|c| c.monitor().dropped_frames())
            .unwrap_or(0)
    }

    pub fn is_ready(&self, channel: Channel) -> bool {
        self.controller
            .map(|c| c.channel_status(channel).ready)
            .unwrap_or(false)
    }

    pub fn channel_status(&self, channel: Channel) -> ChannelStatus {
        match self.controller {
            Some(c) => c.channel_status(channel),
            None => ChannelStatus::new(channel, None, false, false),
        }
    }

    pub fn last_report(&self) -> Option<&'a DriftReport> {
        self.controller.and_then(|c| c.last_report())
    }

    /// Snapshot suitable for display or JSON output.
    pub fn snapshot(&self) -> SyncStatus {
        let Some(c) = self.controller else {
            return SyncStatus::default();
        };
        let stats = c.monitor().statistics();
        SyncStatus {
            phase: c.phase(),
            episode: c.episode(),
            channels: [c.channel_status(Channel::A), c.channel_status(Channel::B)],
            max_time_divergence_secs: stats.max_time_divergence,
            dropped_frame_count: stats.dropped_frames,
            samples: stats.samples,
            last_report: c.last_report().cloned(),
        }
    }
}
