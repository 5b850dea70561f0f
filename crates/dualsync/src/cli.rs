use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dualsync", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Session config file (TOML) with `[sync]` and `[channels.a]`/`[channels.b]` tables
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Controller tick rate in Hz (one tick per rendered frame is typical)
    #[arg(long, global = true)]
    pub tick_hz: Option<u32>,

    /// Time divergence in milliseconds above which a sample counts as an excursion
    #[arg(long, global = true)]
    pub tolerance_ms: Option<f64>,

    /// Clock skew of channel B in parts per million (negative runs slow)
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub skew_ppm_b: Option<f64>,

    /// Channel B holds one frame too long every N frames
    #[arg(long, global = true)]
    pub stall_every_b: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive session driven by stdin commands (Enter toggles, `q` quits)
    Run {
        /// Media source for channel A
        #[arg(long)]
        source_a: Option<String>,

        /// Media source for channel B
        #[arg(long)]
        source_b: Option<String>,
    },

    /// Headless deterministic run that prints one drift report per episode
    Simulate {
        /// Media source for channel A
        #[arg(long)]
        source_a: Option<String>,

        /// Media source for channel B
        #[arg(long)]
        source_b: Option<String>,

        /// Number of play/stop episodes
        #[arg(long, default_value_t = 1)]
        episodes: u32,

        /// Playing time per episode in seconds
        #[arg(long, default_value_t = 10.0)]
        episode_secs: f64,

        /// Give up if both channels are not ready after this many ticks
        #[arg(long, default_value_t = 600)]
        ready_timeout_ticks: u64,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}
