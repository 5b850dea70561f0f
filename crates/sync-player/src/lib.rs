//! Two-channel video playback synchronization.
//!
//! A [`controller::PlaybackController`] owns two [`engine::PlaybackEngine`]s, drives them
//! through `Idle → Preparing → Ready → Playing → Stopped` together, and feeds live position
//! samples into a [`drift::DriftMonitor`] once per tick while both are playing.
//!
//! Everything runs on one control thread: readiness is polled on every tick, never
//! awaited, so [`controller::PlaybackController::tick`] never blocks.

pub mod config;
pub mod controller;
pub mod drift;
pub mod engine;
pub mod error;
pub mod sim;
pub mod sink;
pub mod status;

pub use dualsync_types as types;
