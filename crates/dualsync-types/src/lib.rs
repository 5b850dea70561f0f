use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two playback outputs kept in sync.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// Both channels in index order.
    pub const BOTH: [Channel; 2] = [Channel::A, Channel::B];

    /// Stable array index (`A` = 0, `B` = 1).
    pub fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::A => f.write_str("A"),
            Channel::B => f.write_str("B"),
        }
    }
}

/// Overall phase of a two-channel sync session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No source has been loaded yet.
    #[default]
    Idle,
    /// At least one channel is still preparing its media.
    Preparing,
    /// Both channels are prepared and can start together.
    Ready,
    /// Both channels are playing; drift is being sampled.
    Playing,
    /// Transient phase between a stop and the next preparation cycle.
    Stopped,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Preparing => "preparing",
            SessionPhase::Ready => "ready",
            SessionPhase::Playing => "playing",
            SessionPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Colour hint for a channel's status slot.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    /// Nothing loaded.
    #[default]
    Idle,
    /// Work in progress (shown red).
    Pending,
    /// Ready or playing (shown green).
    Ok,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Indicator::Idle => "idle",
            Indicator::Pending => "wait",
            Indicator::Ok => "ok",
        };
        f.write_str(name)
    }
}

/// Per-channel display state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelStatus {
    pub channel: Channel,
    /// Media source currently assigned to the channel.
    pub source: Option<String>,
    /// Last readiness observed by the controller.
    pub ready: bool,
    /// Whether the channel is part of a running episode.
    pub playing: bool,
    /// Human-readable line for a status display.
    pub label: String,
    pub indicator: Indicator,
}

impl ChannelStatus {
    pub const LABEL_EMPTY: &'static str = "No source loaded.";
    pub const LABEL_PREPARING: &'static str = "Preparing video for playback.";
    pub const LABEL_READY: &'static str = "Video is ready for playback.";
    pub const LABEL_PLAYING: &'static str = "Playing.";

    /// Derive the display label and indicator from the raw flags.
    pub fn new(channel: Channel, source: Option<String>, ready: bool, playing: bool) -> Self {
        let (label, indicator) = match (source.is_some(), ready, playing) {
            (_, _, true) => (Self::LABEL_PLAYING, Indicator::Ok),
            (_, true, false) => (Self::LABEL_READY, Indicator::Ok),
            (true, false, false) => (Self::LABEL_PREPARING, Indicator::Pending),
            (false, false, false) => (Self::LABEL_EMPTY, Indicator::Idle),
        };
        Self {
            channel,
            source,
            ready,
            playing,
            label: label.to_string(),
            indicator,
        }
    }
}

/// Why a playing episode ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeEnd {
    /// Stopped by an explicit toggle.
    Stopped,
    /// One channel stopped playing on its own (end of media, engine fault).
    ChannelEnded,
}

/// Drift summary emitted when an episode ends.
///
/// `dropped_frame_count` attributes every non-zero frame divergence seen at a
/// sample to dropped frames. It is a measurement heuristic: the divergence may
/// equally come from the other channel running ahead.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DriftReport {
    /// 1-based episode number within the session.
    pub episode: u64,
    /// Largest absolute time divergence observed, in seconds.
    pub max_time_divergence_secs: f64,
    /// Sum of frame divergences over all samples.
    pub dropped_frame_count: u64,
    /// Number of samples recorded.
    pub samples: u64,
    /// Samples whose time divergence exceeded the configured tolerance.
    pub excursions: u64,
    pub end: EpisodeEnd,
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "episode {}: max. timing error {:.4} s, frames dropped {} ({} samples, {} over tolerance)",
            self.episode,
            self.max_time_divergence_secs,
            self.dropped_frame_count,
            self.samples,
            self.excursions
        )?;
        if self.end == EpisodeEnd::ChannelEnded {
            f.write_str(", ended by channel")?;
        }
        Ok(())
    }
}

/// Point-in-time view of a sync session for displays and JSON output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncStatus {
    pub phase: SessionPhase,
    /// Episodes started so far.
    pub episode: u64,
    pub channels: [ChannelStatus; 2],
    /// Running maximum for the current (or last) episode.
    pub max_time_divergence_secs: f64,
    /// Running dropped-frame count for the current (or last) episode.
    pub dropped_frame_count: u64,
    pub samples: u64,
    /// Report emitted by the most recent stop.
    pub last_report: Option<DriftReport>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            episode: 0,
            channels: [
                ChannelStatus::new(Channel::A, None, false, false),
                ChannelStatus::new(Channel::B, None, false, false),
            ],
            max_time_divergence_secs: 0.0,
            dropped_frame_count: 0,
            samples: 0,
            last_report: None,
        }
    }
}
