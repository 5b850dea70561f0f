//! Divergence measurement between two playing channels.
//!
//! [`DriftMonitor::sample`] is a pure read of both engines; [`DriftMonitor::record`]
//! folds a sample into the running statistics for the current episode.

use dualsync_types::{DriftReport, EpisodeEnd};

use crate::engine::PlaybackEngine;

/// Instantaneous divergence between the two channels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriftSample {
    /// `|A.time - B.time|` in seconds.
    pub time_delta: f64,
    /// `|A.frame - B.frame|`.
    pub frame_delta: u64,
}

/// Running drift statistics for one episode.
///
/// Both counters only grow within an episode. `dropped_frames` adds every non-zero
/// frame divergence seen at a sample; it approximates dropped frames and is not a
/// causal count (the other channel may simply be ahead).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriftStatistics {
    pub max_time_divergence: f64,
    pub dropped_frames: u64,
    pub samples: u64,
    /// Samples whose time divergence exceeded the tolerance.
    pub excursions: u64,
    pub last: Option<DriftSample>,
}

#[derive(Debug)]
pub struct DriftMonitor {
    tolerance_secs: f64,
    stats: DriftStatistics,
}

impl DriftMonitor {
    pub fn new(tolerance_secs: f64) -> Self {
        Self {
            tolerance_secs,
            stats: DriftStatistics::default(),
        }
    }

    /// Measure the divergence between two engines' current positions.
    ///
    /// Symmetric in its arguments.
    pub fn sample<A, B>(a: &A, b: &B) -> DriftSample
    where
        A: PlaybackEngine + ?Sized,
        B: PlaybackEngine + ?Sized,
    {
        let time_delta = (a.current_time() - b.current_time()).abs();
        DriftSample {
            time_delta: if time_delta.is_finite() { time_delta } else { 0.0 },
            frame_delta: a.current_frame().abs_diff(b.current_frame()),
        }
    }

    /// Fold one sample into the episode statistics.
    pub fn record(&mut self, sample: DriftSample) {
        let stats = &mut self.stats;
        stats.samples = stats.samples.saturating_add(1);
        stats.last = Some(sample);

        let over = sample.time_delta > self.tolerance_secs;
        if over {
            stats.excursions = stats.excursions.saturating_add(1);
        }
        if sample.time_delta > stats.max_time_divergence {
            if over {
                tracing::warn!(
                    time_delta = sample.time_delta,
                    tolerance = self.tolerance_secs,
                    "new max drift above tolerance"
                );
            }
            stats.max_time_divergence = sample.time_delta;
        }
        if sample.frame_delta > 0 {
            stats.dropped_frames = stats.dropped_frames.saturating_add(sample.frame_delta);
        }
    }

    /// Zero all statistics for a new episode.
    pub fn reset(&mut self) {
        self.stats = DriftStatistics::default();
    }

    pub fn statistics(&self) -> DriftStatistics {
        self.stats
    }

    pub fn max_time_divergence(&self) -> f64 {
        self.stats.max_time_divergence
    }

    pub fn dropped_frames(&self) -> u64 {
        self.stats.dropped_frames
    }

    /// Summarize the current statistics for the end of `episode`.
    pub fn report(&self, episode: u64, end: EpisodeEnd) -> DriftReport {
        DriftReport {
            episode,
            max_time_divergence_secs: self.stats.max_time_divergence,
            dropped_frame_count: self.stats.dropped_frames,
            samples: self.stats.samples,
            excursions: self.stats.excursions,
            end,
        }
    }
}
