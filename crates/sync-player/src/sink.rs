//! Outbound status: per-channel display slots and end-of-episode reports.

use std::sync::{Arc, Mutex};

use dualsync_types::{Channel, ChannelStatus, DriftReport, SessionPhase};

/// Receiver for everything the controller publishes.
pub trait StatusSink {
    /// A channel's display state changed (readiness, source, playing).
    fn channel_changed(&mut self, status: &ChannelStatus);

    /// An episode ended; `report` holds its final drift statistics.
    fn drift_report(&mut self, report: &DriftReport);

    fn phase_changed(&mut self, _from: SessionPhase, _to: SessionPhase) {}
}

/// Publishes status as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn channel_changed(&mut self, status: &ChannelStatus) {
        tracing::info!(
            channel = %status.channel,
            ready = status.ready,
            playing = status.playing,
            "{}",
            status.label
        );
    }

    fn drift_report(&mut self, report: &DriftReport) {
        tracing::info!(
            episode = report.episode,
            max_time_divergence_secs = report.max_time_divergence_secs,
            dropped_frame_count = report.dropped_frame_count,
            samples = report.samples,
            excursions = report.excursions,
            end = ?report.end,
            "drift report"
        );
    }

    fn phase_changed(&mut self, from: SessionPhase, to: SessionPhase) {
        tracing::debug!(%from, %to, "phase changed");
    }
}

#[derive(Debug, Default)]
struct TextLogState {
    channels: [Option<ChannelStatus>; 2],
    lines: Vec<String>,
    phases: Vec<SessionPhase>,
}

/// Text display model: two channel slots plus an append-only debug log.
///
/// Cloning shares the same underlying state, so a host can keep a handle while the
/// controller owns another.
#[derive(Clone, Debug, Default)]
pub struct TextLog {
    inner: Arc<Mutex<TextLogState>>,
}

impl TextLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current text of a channel slot (empty before the first update).
    pub fn channel_text(&self, channel: Channel) -> String {
        self.with_state(|s| {
            s.channels[channel.index()]
                .as_ref()
                .map(|c| c.label.clone())
                .unwrap_or_default()
        })
    }

    pub fn channel_status(&self, channel: Channel) -> Option<ChannelStatus> {
        self.with_state(|s| s.channels[channel.index()].clone())
    }

    /// All appended debug lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.with_state(|s| s.lines.clone())
    }

    /// Every phase entered since the log was attached.
    pub fn phases(&self) -> Vec<SessionPhase> {
        self.with_state(|s| s.phases.clone())
    }

    fn push_line(&self, line: impl Into<String>) {
        let line = line.into();
        self.with_state(|s| s.lines.push(line));
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut TextLogState) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl StatusSink for TextLog {
    fn channel_changed(&mut self, status: &ChannelStatus) {
        let idx = status.channel.index();
        let status = status.clone();
        self.with_state(|s| s.channels[idx] = Some(status));
    }

    fn drift_report(&mut self, report: &DriftReport) {
        self.push_line(report.to_string());
    }

    fn phase_changed(&mut self, _from: SessionPhase, to: SessionPhase) {
        self.with_state(|s| s.phases.push(to));
    }
}
