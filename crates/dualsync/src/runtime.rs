//! Session runtimes.
//!
//! Both modes drive a [`PlaybackController`] over two [`SimulatedEngine`]s sharing one
//! [`SimClock`]: `run_interactive` advances the clock with wall time and takes commands
//! from stdin, `run_simulation` advances it by a fixed step per tick.

use std::io::BufRead;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use dualsync_types::{Channel, DriftReport, SessionPhase, SyncStatus};
use serde::Serialize;
use sync_player::controller::{PlaybackController, Toggle};
use sync_player::sim::{SimClock, SimulatedEngine};
use sync_player::sink::{TextLog, TracingSink};

use crate::config::SessionConfig;

/// Commands accepted by the interactive loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Toggle,
    Load { channel: Channel, path: String },
    Status,
    Help,
    Quit,
}

const HELP: &str = "commands: <enter>|t toggle, a <path>|b <path> load channel, s status, q quit";

/// Parse one line of interactive input. Unknown input yields `None`.
pub fn parse_command(line: &str) -> Option<UserCommand> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head.to_ascii_lowercase().as_str() {
        "" | "t" | "toggle" => Some(UserCommand::Toggle),
        "a" => Some(UserCommand::Load {
            channel: Channel::A,
            path: rest.to_string(),
        }),
        "b" => Some(UserCommand::Load {
            channel: Channel::B,
            path: rest.to_string(),
        }),
        "s" | "status" => Some(UserCommand::Status),
        "h" | "help" | "?" => Some(UserCommand::Help),
        "q" | "quit" | "exit" => Some(UserCommand::Quit),
        _ => None,
    }
}

/// Build a controller over two simulated engines on `clock`.
fn build_controller(
    cfg: &SessionConfig,
    clock: &SimClock,
    log: &TextLog,
) -> Result<PlaybackController<SimulatedEngine>> {
    let engine = |channel: Channel| {
        SimulatedEngine::new(
            format!("channel-{channel}"),
            clock.clone(),
            cfg.channel(channel).profile.clone(),
        )
    };
    PlaybackController::builder()
        .engine(Channel::A, engine(Channel::A))
        .engine(Channel::B, engine(Channel::B))
        .sink(TracingSink)
        .sink(log.clone())
        .config(cfg.sync.clone())
        .build()
        .context("build sync controller")
}

/// Options for a headless run.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub episodes: u32,
    pub episode_secs: f64,
    pub ready_timeout_ticks: u64,
}

/// Result of a headless run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub reports: Vec<DriftReport>,
    pub ticks: u64,
    pub status: SyncStatus,
}

/// Run `episodes` play/stop cycles on a fixed-step clock and collect their reports.
pub fn run_simulation(cfg: &SessionConfig, opts: &SimulationOptions) -> Result<SimulationSummary> {
    if !(opts.episode_secs.is_finite() && opts.episode_secs > 0.0) {
        bail!("episode length must be positive, got {}", opts.episode_secs);
    }
    let clock = SimClock::new();
    let log = TextLog::new();
    let mut ctl = build_controller(cfg, &clock, &log)?;
    for channel in Channel::BOTH {
        let source = cfg.channel(channel).source.as_deref().ok_or_else(|| {
            anyhow!(
                "channel {channel} has no source; pass --source-{} or set it in the config",
                channel.to_string().to_lowercase()
            )
        })?;
        ctl.set_video_source(source, channel)?;
    }

    let step = cfg.sync.tick_interval();
    let ticks_per_episode =
        (opts.episode_secs * f64::from(cfg.sync.tick_hz)).round().max(1.0) as u64;
    let mut reports = Vec::with_capacity(opts.episodes as usize);

    for _ in 0..opts.episodes {
        wait_until_ready(&mut ctl, &clock, step, opts.ready_timeout_ticks)?;
        ctl.toggle_playback()?;

        for _ in 0..ticks_per_episode {
            clock.advance(step);
            ctl.tick();
            if !ctl.is_playing() {
                break;
            }
        }

        let report = if ctl.is_playing() {
            match ctl.toggle_playback()? {
                Toggle::Stopped(report) => report,
                Toggle::Started { .. } => bail!("toggle started playback while playing"),
            }
        } else {
            ctl.last_report()
                .cloned()
                .context("episode ended without a report")?
        };
        reports.push(report);
    }

    Ok(SimulationSummary {
        reports,
        ticks: ctl.ticks(),
        status: ctl.status().snapshot(),
    })
}

fn wait_until_ready(
    ctl: &mut PlaybackController<SimulatedEngine>,
    clock: &SimClock,
    step: Duration,
    timeout_ticks: u64,
) -> Result<()> {
    for _ in 0..timeout_ticks {
        if ctl.phase() == SessionPhase::Ready {
            return Ok(());
        }
        clock.advance(step);
        ctl.tick();
    }
    if ctl.phase() == SessionPhase::Ready {
        return Ok(());
    }
    bail!(
        "channels not ready after {timeout_ticks} ticks (A ready: {}, B ready: {})",
        ctl.status().is_ready(Channel::A),
        ctl.status().is_ready(Channel::B)
    )
}

/// Run an interactive session until `q`, end of input, or Ctrl-C.
pub fn run_interactive(cfg: &SessionConfig) -> Result<()> {
    let clock = SimClock::new();
    let log = TextLog::new();
    let mut ctl = build_controller(cfg, &clock, &log)?;
    for channel in Channel::BOTH {
        if let Some(source) = cfg.channel(channel).source.as_deref() {
            ctl.set_video_source(source, channel)?;
        }
    }

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<UserCommand>();
    let ctrlc_tx = cmd_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(UserCommand::Quit);
    })
    .context("install Ctrl-C handler")?;
    spawn_stdin_reader(cmd_tx);

    println!("{HELP}");
    tick_loop(&mut ctl, &clock, &log, &cmd_rx, cfg.sync.tick_interval())
}

fn spawn_stdin_reader(cmd_tx: Sender<UserCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(cmd) => {
                    if cmd_tx.send(cmd).is_err() {
                        return;
                    }
                }
                None => println!("unknown command {:?}; {HELP}", line.trim()),
            }
        }
        let _ = cmd_tx.send(UserCommand::Quit);
    });
}

fn tick_loop(
    ctl: &mut PlaybackController<SimulatedEngine>,
    clock: &SimClock,
    log: &TextLog,
    cmd_rx: &Receiver<UserCommand>,
    interval: Duration,
) -> Result<()> {
    let mut last = Instant::now();
    let mut next_tick = last + interval;
    let mut printed_lines = log.lines().len();

    loop {
        match cmd_rx.recv_deadline(next_tick) {
            Ok(UserCommand::Quit) => break,
            Ok(cmd) => handle_command(ctl, cmd),
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                clock.advance(now.saturating_duration_since(last));
                last = now;
                ctl.tick();
                next_tick += interval;
                if next_tick < now {
                    // Fell behind (suspended terminal, slow host); don't burst.
                    next_tick = now + interval;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let lines = log.lines();
        for line in &lines[printed_lines..] {
            println!("{line}");
        }
        printed_lines = lines.len();
    }

    if ctl.is_playing() {
        if let Ok(Toggle::Stopped(report)) = ctl.toggle_playback() {
            println!("{report}");
        }
    }
    tracing::info!(episodes = ctl.episode(), "session finished");
    Ok(())
}

fn handle_command(ctl: &mut PlaybackController<SimulatedEngine>, cmd: UserCommand) {
    match cmd {
        UserCommand::Toggle => match ctl.toggle_playback() {
            Ok(Toggle::Started { episode }) => println!("playing (episode {episode})"),
            Ok(Toggle::Stopped(_)) => println!("stopped; preparing both channels"),
            Err(e) => tracing::warn!("toggle failed: {e}"),
        },
        UserCommand::Load { channel, path } => {
            if let Err(e) = ctl.set_video_source(&path, channel) {
                tracing::warn!("load failed: {e}");
            }
        }
        UserCommand::Status => print_status(&ctl.status().snapshot()),
        UserCommand::Help => println!("{HELP}"),
        UserCommand::Quit => {}
    }
}

fn print_status(status: &SyncStatus) {
    println!(
        "phase {} | episode {} | max drift {:.4} s | dropped {} | samples {}",
        status.phase,
        status.episode,
        status.max_time_divergence_secs,
        status.dropped_frame_count,
        status.samples
    );
    for ch in &status.channels {
        println!(
            "  {} [{}] {} ({})",
            ch.channel,
            ch.indicator,
            ch.label,
            ch.source.as_deref().unwrap_or("-")
        );
    }
}

/// Print a simulation summary as text.
pub fn print_summary(summary: &SimulationSummary) {
    for report in &summary.reports {
        println!("{report}");
    }
    print_status(&summary.status);
}
