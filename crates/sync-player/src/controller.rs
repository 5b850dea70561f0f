//! Two-channel playback state machine.
//!
//! ```text
//! Idle ─set_video_source─▶ Preparing ─(both ready, polled)─▶ Ready
//!                              ▲                               │ toggle
//!                              │                               ▼
//!                           Stopped ◀──────── toggle ──────── Playing
//! ```
//!
//! The controller is the only writer of both engines. Readiness is discovered by polling
//! on every [`PlaybackController::tick`]; nothing here blocks or registers callbacks.

use dualsync_types::{Channel, ChannelStatus, DriftReport, EpisodeEnd, SessionPhase};

use crate::config::SyncConfig;
use crate::drift::{DriftMonitor, DriftSample};
use crate::engine::PlaybackEngine;
use crate::error::{Result, SyncError};
use crate::sink::StatusSink;
use crate::status::StatusReporter;

/// Outcome of [`PlaybackController::toggle_playback`].
#[derive(Clone, Debug, PartialEq)]
pub enum Toggle {
    /// Both channels started; drift statistics were reset.
    Started { episode: u64 },
    /// Both channels stopped and are preparing again.
    Stopped(DriftReport),
}

struct ChannelSlot<E> {
    engine: E,
    source: Option<String>,
    /// Readiness as of the last poll.
    ready: bool,
    playing: bool,
}

impl<E> ChannelSlot<E> {
    fn new(engine: E) -> Self {
        Self {
            engine,
            source: None,
            ready: false,
            playing: false,
        }
    }

    fn status(&self, channel: Channel) -> ChannelStatus {
        ChannelStatus::new(channel, self.source.clone(), self.ready, self.playing)
    }
}

/// Collects the controller's collaborators; refuses to build with any missing.
pub struct ControllerBuilder<E> {
    engines: [Option<E>; 2],
    sinks: Vec<Box<dyn StatusSink>>,
    config: SyncConfig,
}

impl<E: PlaybackEngine> Default for ControllerBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PlaybackEngine> ControllerBuilder<E> {
    pub fn new() -> Self {
        Self {
            engines: [None, None],
            sinks: Vec::new(),
            config: SyncConfig::default(),
        }
    }

    /// Bind the engine driving `channel`.
    pub fn engine(mut self, channel: Channel, engine: E) -> Self {
        self.engines[channel.index()] = Some(engine);
        self
    }

    /// Attach a status sink. At least one is required.
    pub fn sink(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<PlaybackController<E>> {
        let [a, b] = self.engines;
        let a = a.ok_or(SyncError::MissingBinding("engine for channel A"))?;
        let b = b.ok_or(SyncError::MissingBinding("engine for channel B"))?;
        if self.sinks.is_empty() {
            return Err(SyncError::MissingBinding("status sink"));
        }

        let mut controller = PlaybackController {
            channels: [ChannelSlot::new(a), ChannelSlot::new(b)],
            phase: SessionPhase::Idle,
            monitor: DriftMonitor::new(self.config.effective_tolerance()),
            sinks: self.sinks,
            episode: 0,
            ticks: 0,
            last_report: None,
        };
        for channel in Channel::BOTH {
            controller.publish_channel(channel);
        }
        Ok(controller)
    }
}

/// Drives two engines in lockstep and measures their drift while playing.
pub struct PlaybackController<E> {
    channels: [ChannelSlot<E>; 2],
    phase: SessionPhase,
    monitor: DriftMonitor,
    sinks: Vec<Box<dyn StatusSink>>,
    episode: u64,
    ticks: u64,
    last_report: Option<DriftReport>,
}

impl<E: PlaybackEngine> PlaybackController<E> {
    pub fn builder() -> ControllerBuilder<E> {
        ControllerBuilder::new()
    }

    /// Load `path` on one channel and start preparing it.
    ///
    /// The other channel is untouched, so the two may be loaded at different times.
    pub fn set_video_source(&mut self, path: &str, channel: Channel) -> Result<()> {
        if self.phase == SessionPhase::Playing {
            return Err(SyncError::InvalidPhase {
                operation: "set_video_source",
                phase: self.phase,
            });
        }
        if path.trim().is_empty() {
            tracing::warn!(channel = %channel, "empty source path ignored");
            return Err(SyncError::EmptySource(channel));
        }

        let slot = &mut self.channels[channel.index()];
        slot.engine.set_source(path);
        slot.engine.prepare();
        slot.source = Some(path.to_string());
        slot.ready = false;
        tracing::info!(channel = %channel, source = path, "preparing source");

        self.publish_channel(channel);
        self.transition(SessionPhase::Preparing);
        Ok(())
    }

    /// Load both channels.
    pub fn initialize(&mut self, source_a: &str, source_b: &str) -> Result<()> {
        self.set_video_source(source_a, Channel::A)?;
        self.set_video_source(source_b, Channel::B)
    }

    /// Advance the session by one scheduler tick.
    ///
    /// Returns the drift sample recorded on this tick, if the session is playing.
    pub fn tick(&mut self) -> Option<DriftSample> {
        self.ticks = self.ticks.saturating_add(1);
        if self.phase == SessionPhase::Playing {
            self.tick_playing()
        } else {
            self.poll_readiness();
            None
        }
    }

    /// Start both channels when ready, or stop them and report when playing.
    pub fn toggle_playback(&mut self) -> Result<Toggle> {
        match self.phase {
            SessionPhase::Playing => Ok(Toggle::Stopped(self.finish_episode(EpisodeEnd::Stopped))),
            SessionPhase::Ready => self.start_episode(),
            phase => Err(SyncError::InvalidPhase {
                operation: "toggle_playback",
                phase,
            }),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == SessionPhase::Playing
    }

    /// Episodes started so far.
    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn monitor(&self) -> &DriftMonitor {
        &self.monitor
    }

    pub fn last_report(&self) -> Option<&DriftReport> {
        self.last_report.as_ref()
    }

    pub fn channel_status(&self, channel: Channel) -> ChannelStatus {
        self.channels[channel.index()].status(channel)
    }

    /// Read-only status view over this session.
    pub fn status(&self) -> StatusReporter<'_, E> {
        StatusReporter::new(self)
    }

    fn poll_readiness(&mut self) {
        for channel in Channel::BOTH {
            let slot = &mut self.channels[channel.index()];
            let ready = slot.engine.is_ready();
            if ready != slot.ready {
                slot.ready = ready;
                tracing::debug!(channel = %channel, ready, "readiness changed");
                self.publish_channel(channel);
            }
        }

        let both_ready = self.channels.iter().all(|slot| slot.ready);
        match self.phase {
            SessionPhase::Preparing if both_ready => self.transition(SessionPhase::Ready),
            SessionPhase::Ready if !both_ready => self.transition(SessionPhase::Preparing),
            _ => {}
        }
    }

    fn tick_playing(&mut self) -> Option<DriftSample> {
        if let Some(ended) = Channel::BOTH
            .into_iter()
            .find(|ch| !self.channels[ch.index()].engine.is_playing())
        {
            tracing::warn!(channel = %ended, "channel stopped playing on its own");
            self.finish_episode(EpisodeEnd::ChannelEnded);
            return None;
        }

        let [a, b] = &self.channels;
        let sample = DriftMonitor::sample(&a.engine, &b.engine);
        self.monitor.record(sample);
        Some(sample)
    }

    fn start_episode(&mut self) -> Result<Toggle> {
        for slot in &mut self.channels {
            slot.engine.play();
        }

        if let Some(refused) = Channel::BOTH
            .into_iter()
            .find(|ch| !self.channels[ch.index()].engine.is_playing())
        {
            tracing::warn!(channel = %refused, "channel refused to start; re-preparing both");
            for slot in &mut self.channels {
                slot.engine.stop();
            }
            self.reprepare_both();
            self.transition(SessionPhase::Preparing);
            return Err(SyncError::StartRefused(refused));
        }

        self.monitor.reset();
        self.episode = self.episode.saturating_add(1);
        for channel in Channel::BOTH {
            self.channels[channel.index()].playing = true;
            self.publish_channel(channel);
        }
        self.transition(SessionPhase::Playing);
        tracing::info!(episode = self.episode, "playback started");
        Ok(Toggle::Started {
            episode: self.episode,
        })
    }

    fn finish_episode(&mut self, end: EpisodeEnd) -> DriftReport {
        for slot in &mut self.channels {
            slot.engine.stop();
            slot.playing = false;
        }

        let report = self.monitor.report(self.episode, end);
        tracing::info!(
            episode = report.episode,
            max_time_divergence_secs = report.max_time_divergence_secs,
            dropped_frame_count = report.dropped_frame_count,
            "playback stopped"
        );
        for sink in &mut self.sinks {
            sink.drift_report(&report);
        }
        self.last_report = Some(report.clone());

        self.transition(SessionPhase::Stopped);
        self.reprepare_both();
        self.transition(SessionPhase::Preparing);
        report
    }

    fn reprepare_both(&mut self) {
        for channel in Channel::BOTH {
            let slot = &mut self.channels[channel.index()];
            slot.engine.prepare();
            slot.ready = false;
            slot.playing = false;
            self.publish_channel(channel);
        }
    }

    fn transition(&mut self, to: SessionPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        tracing::info!(%from, %to, "session phase");
        for sink in &mut self.sinks {
            sink.phase_changed(from, to);
        }
    }

    fn publish_channel(&mut self, channel: Channel) {
        let status = self.channels[channel.index()].status(channel);
        for sink in &mut self.sinks {
            sink.channel_changed(&status);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::sink::TextLog;

    #[derive(Debug, Default)]
    struct Script {
        source: Option<String>,
        /// Set by the test to complete a pending `prepare()`.
        prepared: bool,
        /// Complete every `prepare()` immediately.
        auto_ready: bool,
        refuse_play: bool,
        playing: bool,
        time: f64,
        frame: u64,
        prepare_calls: u32,
        stop_calls: u32,
    }

    /// Engine double whose state the test mutates through a shared handle.
    #[derive(Clone, Debug, Default)]
    struct ScriptedEngine(Rc<RefCell<Script>>);

    impl ScriptedEngine {
        fn set_ready(&self, ready: bool) {
            self.0.borrow_mut().prepared = ready;
        }

        fn set_position(&self, time: f64, frame: u64) {
            let mut s = self.0.borrow_mut();
            s.time = time;
            s.frame = frame;
        }

        fn script(&self) -> std::cell::Ref<'_, Script> {
            self.0.borrow()
        }
    }

    impl PlaybackEngine for ScriptedEngine {
        fn set_source(&mut self, source: &str) {
            let mut s = self.0.borrow_mut();
            if !source.is_empty() {
                s.source = Some(source.to_string());
                s.prepared = false;
            }
        }

        fn prepare(&mut self) {
            let mut s = self.0.borrow_mut();
            s.prepare_calls += 1;
            s.prepared = s.auto_ready;
        }

        fn is_ready(&self) -> bool {
            self.0.borrow().prepared
        }

        fn play(&mut self) {
            let mut s = self.0.borrow_mut();
            if s.prepared && !s.refuse_play {
                s.playing = true;
            }
        }

        fn stop(&mut self) {
            let mut s = self.0.borrow_mut();
            s.stop_calls += 1;
            s.playing = false;
            s.prepared = false;
            s.time = 0.0;
            s.frame = 0;
        }

        fn is_playing(&self) -> bool {
            self.0.borrow().playing
        }

        fn current_time(&self) -> f64 {
            self.0.borrow().time
        }

        fn current_frame(&self) -> u64 {
            self.0.borrow().frame
        }
    }

    struct Rig {
        ctl: PlaybackController<ScriptedEngine>,
        a: ScriptedEngine,
        b: ScriptedEngine,
        log: TextLog,
    }

    fn rig() -> Rig {
        let a = ScriptedEngine::default();
        let b = ScriptedEngine::default();
        let log = TextLog::new();
        let ctl = PlaybackController::builder()
            .engine(Channel::A, a.clone())
            .engine(Channel::B, b.clone())
            .sink(log.clone())
            .build()
            .expect("build controller");
        Rig { ctl, a, b, log }
    }

    /// Load both channels, mark them ready and start playing.
    fn playing_rig() -> Rig {
        let mut r = rig();
        r.ctl.initialize("left.mp4", "right.mp4").unwrap();
        r.a.set_ready(true);
        r.b.set_ready(true);
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Ready);
        r.ctl.toggle_playback().unwrap();
        r
    }

    #[test]
    fn build_requires_engines_and_sink() {
        let missing_b = PlaybackController::builder()
            .engine(Channel::A, ScriptedEngine::default())
            .sink(TextLog::new())
            .build();
        assert!(matches!(
            missing_b,
            Err(SyncError::MissingBinding("engine for channel B"))
        ));

        let missing_sink = PlaybackController::builder()
            .engine(Channel::A, ScriptedEngine::default())
            .engine(Channel::B, ScriptedEngine::default())
            .build();
        assert!(matches!(
            missing_sink,
            Err(SyncError::MissingBinding("status sink"))
        ));
    }

    #[test]
    fn build_publishes_empty_channel_slots() {
        let r = rig();
        assert_eq!(r.ctl.phase(), SessionPhase::Idle);
        assert_eq!(r.log.channel_text(Channel::A), ChannelStatus::LABEL_EMPTY);
        assert_eq!(r.log.channel_text(Channel::B), ChannelStatus::LABEL_EMPTY);
    }

    #[test]
    fn empty_source_is_rejected_without_side_effects() {
        let mut r = rig();
        let err = r.ctl.set_video_source("", Channel::A).unwrap_err();
        assert_eq!(err, SyncError::EmptySource(Channel::A));
        assert_eq!(r.a.script().prepare_calls, 0);
        assert!(r.a.script().source.is_none());
        assert!(!r.ctl.channel_status(Channel::A).ready);
        assert_eq!(r.ctl.phase(), SessionPhase::Idle);
    }

    #[test]
    fn channels_are_prepared_independently() {
        let mut r = rig();
        r.ctl.set_video_source("left.mp4", Channel::A).unwrap();
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        assert_eq!(r.a.script().prepare_calls, 1);
        assert_eq!(r.b.script().prepare_calls, 0);

        r.a.set_ready(true);
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        assert_eq!(r.log.channel_text(Channel::A), ChannelStatus::LABEL_READY);
        assert_eq!(r.log.channel_text(Channel::B), ChannelStatus::LABEL_EMPTY);

        r.ctl.set_video_source("right.mp4", Channel::B).unwrap();
        assert_eq!(r.log.channel_text(Channel::B), ChannelStatus::LABEL_PREPARING);
        r.b.set_ready(true);
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Ready);
        assert_eq!(r.log.channel_text(Channel::B), ChannelStatus::LABEL_READY);
    }

    #[test]
    fn toggle_before_ready_is_invalid() {
        let mut r = rig();
        assert_eq!(
            r.ctl.toggle_playback(),
            Err(SyncError::InvalidPhase {
                operation: "toggle_playback",
                phase: SessionPhase::Idle,
            })
        );
        r.ctl.initialize("left.mp4", "right.mp4").unwrap();
        assert!(matches!(
            r.ctl.toggle_playback(),
            Err(SyncError::InvalidPhase {
                phase: SessionPhase::Preparing,
                ..
            })
        ));
        assert!(!r.a.script().playing);
    }

    #[test]
    fn ready_tick_then_start_then_frame_drift() {
        let mut r = rig();
        r.ctl.initialize("left.mp4", "right.mp4").unwrap();
        for _ in 0..4 {
            assert!(r.ctl.tick().is_none());
            assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        }
        r.a.set_ready(true);
        r.b.set_ready(true);
        r.ctl.tick();
        assert_eq!(r.ctl.ticks(), 5);
        assert_eq!(r.ctl.phase(), SessionPhase::Ready);

        r.ctl.tick();
        assert_eq!(
            r.ctl.toggle_playback(),
            Ok(Toggle::Started { episode: 1 })
        );
        assert_eq!(r.ctl.phase(), SessionPhase::Playing);

        r.a.set_position(4.0, 100);
        r.b.set_position(4.0, 102);
        let sample = r.ctl.tick().expect("sample while playing");
        assert_eq!(sample.frame_delta, 2);
        assert_eq!(sample.time_delta, 0.0);
        assert_eq!(r.ctl.monitor().dropped_frames(), 2);
        assert_eq!(r.ctl.monitor().max_time_divergence(), 0.0);
    }

    #[test]
    fn larger_time_gap_raises_max() {
        let mut r = playing_rig();
        r.a.set_position(6.0, 180);
        r.b.set_position(6.03, 180);
        r.ctl.tick();
        assert!((r.ctl.monitor().max_time_divergence() - 0.03).abs() < 1e-9);

        r.a.set_position(10.0, 300);
        r.b.set_position(10.05, 300);
        let sample = r.ctl.tick().unwrap();
        assert!((sample.time_delta - 0.05).abs() < 1e-9);
        assert!((r.ctl.monitor().max_time_divergence() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn stop_reports_once_and_reprepares() {
        let mut r = playing_rig();
        r.a.set_position(1.0, 30);
        r.b.set_position(1.0, 31);
        r.ctl.tick();

        let Toggle::Stopped(report) = r.ctl.toggle_playback().unwrap() else {
            panic!("expected stop");
        };
        assert_eq!(report.episode, 1);
        assert_eq!(report.dropped_frame_count, 1);
        assert_eq!(report.end, EpisodeEnd::Stopped);
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        assert_eq!(r.a.script().prepare_calls, 2);
        assert_eq!(r.b.script().prepare_calls, 2);
        assert!(!r.a.script().playing && !r.b.script().playing);

        // Second toggle in a row: channels are not ready yet.
        assert!(matches!(
            r.ctl.toggle_playback(),
            Err(SyncError::InvalidPhase { .. })
        ));
        assert_eq!(r.log.lines().len(), 1);
        assert!(r.log.lines()[0].contains("frames dropped 1"));
        assert_eq!(r.ctl.last_report(), Some(&report));
    }

    #[test]
    fn statistics_reset_when_a_new_episode_starts() {
        let mut r = playing_rig();
        r.a.set_position(2.0, 60);
        r.b.set_position(2.5, 64);
        r.ctl.tick();
        r.ctl.toggle_playback().unwrap();

        // Final numbers stay visible until the next start.
        assert_eq!(r.ctl.monitor().dropped_frames(), 4);

        r.a.set_ready(true);
        r.b.set_ready(true);
        r.ctl.tick();
        assert_eq!(
            r.ctl.toggle_playback(),
            Ok(Toggle::Started { episode: 2 })
        );
        assert_eq!(r.ctl.monitor().dropped_frames(), 0);
        assert_eq!(r.ctl.monitor().max_time_divergence(), 0.0);
        assert_eq!(r.ctl.monitor().statistics().samples, 0);
    }

    #[test]
    fn phases_follow_the_cycle() {
        let mut r = playing_rig();
        r.ctl.tick();
        r.ctl.toggle_playback().unwrap();
        r.a.set_ready(true);
        r.b.set_ready(true);
        r.ctl.tick();
        r.ctl.toggle_playback().unwrap();

        use SessionPhase::*;
        let phases = r.log.phases();
        assert_eq!(
            phases,
            vec![Preparing, Ready, Playing, Stopped, Preparing, Ready, Playing]
        );
        for pair in phases.windows(2) {
            assert!(!(pair[0] == Preparing && pair[1] == Playing));
        }
    }

    #[test]
    fn channel_ending_on_its_own_ends_the_episode() {
        let mut r = playing_rig();
        r.b.0.borrow_mut().playing = false;
        assert!(r.ctl.tick().is_none());
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        let report = r.ctl.last_report().unwrap();
        assert_eq!(report.end, EpisodeEnd::ChannelEnded);
        assert!(!r.a.script().playing);
    }

    #[test]
    fn refused_start_rolls_back() {
        let mut r = rig();
        r.ctl.initialize("left.mp4", "right.mp4").unwrap();
        r.a.set_ready(true);
        r.b.set_ready(true);
        r.b.0.borrow_mut().refuse_play = true;
        r.ctl.tick();

        assert_eq!(
            r.ctl.toggle_playback(),
            Err(SyncError::StartRefused(Channel::B))
        );
        assert!(!r.a.script().playing);
        assert_eq!(r.a.script().stop_calls, 1);
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        assert_eq!(r.ctl.episode(), 0);
    }

    #[test]
    fn loading_while_playing_is_invalid() {
        let mut r = playing_rig();
        assert!(matches!(
            r.ctl.set_video_source("other.mp4", Channel::A),
            Err(SyncError::InvalidPhase {
                operation: "set_video_source",
                phase: SessionPhase::Playing,
            })
        ));
        assert_eq!(r.a.script().source.as_deref(), Some("left.mp4"));
    }

    #[test]
    fn reloading_a_ready_channel_returns_to_preparing() {
        let mut r = rig();
        r.a.0.borrow_mut().auto_ready = true;
        r.b.0.borrow_mut().auto_ready = true;
        r.ctl.initialize("left.mp4", "right.mp4").unwrap();
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Ready);

        r.b.0.borrow_mut().auto_ready = false;
        r.ctl.set_video_source("other.mp4", Channel::B).unwrap();
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        assert!(r.ctl.channel_status(Channel::A).ready);
    }

    #[test]
    fn engine_losing_readiness_returns_to_preparing() {
        let mut r = rig();
        r.ctl.initialize("left.mp4", "right.mp4").unwrap();
        r.a.set_ready(true);
        r.b.set_ready(true);
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Ready);

        r.a.set_ready(false);
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Preparing);
        assert!(!r.ctl.channel_status(Channel::A).ready);
        assert_eq!(r.log.channel_text(Channel::A), ChannelStatus::LABEL_PREPARING);
        assert_eq!(r.log.channel_text(Channel::B), ChannelStatus::LABEL_READY);
        assert!(matches!(
            r.ctl.toggle_playback(),
            Err(SyncError::InvalidPhase { .. })
        ));

        r.a.set_ready(true);
        r.ctl.tick();
        assert_eq!(r.ctl.phase(), SessionPhase::Ready);
        assert_eq!(r.log.channel_text(Channel::A), ChannelStatus::LABEL_READY);
    }
}
