//! dualsync: drive two video outputs in lockstep and report how far they drift apart.
//!
//! ## Session
//! 1. **Prepare**: each channel loads its source; readiness is polled once per tick.
//! 2. **Play**: once both are ready a toggle starts them together and every tick samples
//!    their time and frame divergence.
//! 3. **Stop**: the next toggle stops both, prints a drift report and re-prepares.
//!
//! ## Modes
//! - `run`: interactive; stdin commands toggle playback and load sources.
//! - `simulate`: headless fixed-step run printing one report per episode.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dualsync::cli::{Args, Command};
use dualsync::config::{Overrides, SessionConfig, SessionFile};
use dualsync::runtime::{self, SimulationOptions};

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,dualsync=info,sync_player=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let file = match &args.config {
        Some(path) => SessionFile::load(path)?,
        None => SessionFile::default(),
    };

    let (source_a, source_b) = match &args.cmd {
        Command::Run { source_a, source_b } | Command::Simulate { source_a, source_b, .. } => {
            (source_a.clone(), source_b.clone())
        }
    };
    let overrides = Overrides {
        tick_hz: args.tick_hz,
        tolerance_ms: args.tolerance_ms,
        sources: [source_a, source_b],
        skew_ppm_b: args.skew_ppm_b,
        stall_every_b: args.stall_every_b,
    };
    let cfg = SessionConfig::resolve(&file, &overrides)?;
    tracing::info!(
        tick_hz = cfg.sync.tick_hz,
        tolerance_secs = cfg.sync.drift_tolerance_secs,
        "session config"
    );

    match args.cmd {
        Command::Run { .. } => runtime::run_interactive(&cfg)?,
        Command::Simulate {
            episodes,
            episode_secs,
            ready_timeout_ticks,
            json,
            ..
        } => {
            let summary = runtime::run_simulation(
                &cfg,
                &SimulationOptions {
                    episodes,
                    episode_secs,
                    ready_timeout_ticks,
                },
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                runtime::print_summary(&summary);
            }
        }
    }

    Ok(())
}
