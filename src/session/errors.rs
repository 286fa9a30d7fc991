//! Session errors
//!
//! Covers:
//! - Rejected round configuration
//! - Commands issued in the wrong engine phase
//! - Speech hook failures (recovered inside the round loop)
//! - Broken internal invariants (fatal to the current round only)

use thiserror::Error;

use super::state::Phase;
use crate::prefs::PrefsError;
use crate::sequence::SequenceError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid round configuration: {0}")]
    InvalidConfig(String),
    #[error("{op} is not allowed while {phase}")]
    InvalidPhase { op: &'static str, phase: Phase },
    #[error("no tokio runtime available to drive the round")]
    NoRuntime,
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    #[error("no finished round to record")]
    NoFinishedRound,
    #[error(transparent)]
    Preferences(#[from] PrefsError),
}

impl From<SequenceError> for SessionError {
    fn from(value: SequenceError) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}

/// Failure reported by the speech hook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeakError {
    #[error("speech output failed: {0}")]
    Failed(String),
}
