//! Errors surfaced by the sync controller.

use dualsync_types::{Channel, SessionPhase};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A required collaborator was not supplied at construction.
    #[error("missing binding: {0}")]
    MissingBinding(&'static str),

    /// The operation is not allowed in the current session phase.
    #[error("{operation} is not allowed while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("empty source path for channel {0}")]
    EmptySource(Channel),

    /// The engine did not report playing after `play()`.
    #[error("channel {0} refused to start")]
    StartRefused(Channel),
}

pub type Result<T> = std::result::Result<T, SyncError>;
