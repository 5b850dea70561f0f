//! Session configuration loading and resolution.
//!
//! The TOML file is optional and every field in it is optional; CLI flags win over the
//! file, and built-in defaults fill whatever is left.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dualsync_types::Channel;
use serde::Deserialize;
use sync_player::config::SyncConfig;
use sync_player::sim::SimProfile;

/// Top-level session file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionFile {
    pub sync: Option<SyncSection>,
    pub channels: Option<ChannelsSection>,
}

/// `[sync]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    /// Controller tick rate in Hz.
    pub tick_hz: Option<u32>,
    /// Drift tolerance in milliseconds.
    pub tolerance_ms: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelsSection {
    pub a: Option<ChannelSection>,
    pub b: Option<ChannelSection>,
}

/// `[channels.a]` / `[channels.b]` tables.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    /// Media source loaded at startup.
    pub source: Option<String>,
    pub fps: Option<f64>,
    /// Simulated preparation latency in milliseconds.
    pub prepare_ms: Option<u64>,
    pub skew_ppm: Option<f64>,
    pub stall_every: Option<u64>,
    /// Media length in seconds; playback ends on its own after it.
    pub duration_secs: Option<f64>,
}

impl SessionFile {
    /// Load a session file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<SessionFile>(raw)?)
    }

    pub fn channel(&self, channel: Channel) -> Option<&ChannelSection> {
        let channels = self.channels.as_ref()?;
        match channel {
            Channel::A => channels.a.as_ref(),
            Channel::B => channels.b.as_ref(),
        }
    }
}

/// Values given on the command line; each one overrides the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub tick_hz: Option<u32>,
    pub tolerance_ms: Option<f64>,
    pub sources: [Option<String>; 2],
    pub skew_ppm_b: Option<f64>,
    pub stall_every_b: Option<u64>,
}

/// One resolved channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub source: Option<String>,
    pub profile: SimProfile,
}

/// Fully resolved session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub sync: SyncConfig,
    pub channels: [ChannelConfig; 2],
}

impl SessionConfig {
    pub fn channel(&self, channel: Channel) -> &ChannelConfig {
        &self.channels[channel.index()]
    }

    /// Merge defaults, the optional file and CLI overrides, validating the result.
    pub fn resolve(file: &SessionFile, overrides: &Overrides) -> Result<Self> {
        let sync = sync_config_from(file, overrides)?;
        let channels = [
            channel_config_from(file, overrides, Channel::A)?,
            channel_config_from(file, overrides, Channel::B)?,
        ];
        Ok(Self { sync, channels })
    }
}

fn sync_config_from(file: &SessionFile, overrides: &Overrides) -> Result<SyncConfig> {
    let section = file.sync.as_ref();
    let defaults = SyncConfig::default();

    let tick_hz = overrides
        .tick_hz
        .or_else(|| section.and_then(|s| s.tick_hz))
        .unwrap_or(defaults.tick_hz);
    if tick_hz == 0 {
        bail!("tick_hz must be greater than zero");
    }

    let drift_tolerance_secs = match overrides
        .tolerance_ms
        .or_else(|| section.and_then(|s| s.tolerance_ms))
    {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms / 1000.0,
        Some(ms) => bail!("tolerance_ms must be a non-negative number, got {ms}"),
        None => defaults.drift_tolerance_secs,
    };

    Ok(SyncConfig {
        drift_tolerance_secs,
        tick_hz,
    })
}

fn channel_config_from(
    file: &SessionFile,
    overrides: &Overrides,
    channel: Channel,
) -> Result<ChannelConfig> {
    let section = file.channel(channel).cloned().unwrap_or_default();
    let defaults = SimProfile::default();

    let source = normalize_source(
        overrides.sources[channel.index()]
            .clone()
            .or(section.source),
    );

    let fps = section.fps.unwrap_or(defaults.fps);
    if !(fps.is_finite() && fps > 0.0) {
        bail!("channels.{} fps must be positive, got {fps}", channel_key(channel));
    }

    let (skew_override, stall_override) = match channel {
        Channel::A => (None, None),
        Channel::B => (overrides.skew_ppm_b, overrides.stall_every_b),
    };
    let skew_ppm = skew_override.or(section.skew_ppm).unwrap_or(defaults.skew_ppm);
    if !skew_ppm.is_finite() {
        bail!("channels.{} skew_ppm must be finite", channel_key(channel));
    }

    let duration = match section.duration_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(
            Duration::try_from_secs_f64(secs).with_context(|| {
                format!(
                    "channels.{} duration_secs is out of range, got {secs}",
                    channel_key(channel)
                )
            })?,
        ),
        Some(secs) => bail!(
            "channels.{} duration_secs must be positive, got {secs}",
            channel_key(channel)
        ),
        None => None,
    };

    Ok(ChannelConfig {
        source,
        profile: SimProfile {
            fps,
            prepare_latency: section
                .prepare_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.prepare_latency),
            skew_ppm,
            stall_every: stall_override.or(section.stall_every).filter(|n| *n > 0),
            duration,
        },
    })
}

fn normalize_source(source: Option<String>) -> Option<String> {
    source.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn channel_key(channel: Channel) -> &'static str {
    match channel {
        Channel::A => "a",
        Channel::B => "b",
    }
}
