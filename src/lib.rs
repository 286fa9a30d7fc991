//! N-back Trainer - working memory drills on a timed stimulus stream
//!
//! A round shows one grid position and/or spoken letter per interval. The
//! player claims a match whenever the current stimulus equals the one shown
//! `n` steps earlier.
//!
//! # Modules
//! - `sequence`: constrained random sequences with a target match rate
//! - `session`: round state, the timed engine, view-model seam
//! - `prefs`: highscore, settings and scoreboard storage
//! - `cli`: crossterm front-end used by the `nback-trainer` binary

pub mod cli;
pub mod prefs;
pub mod sequence;
pub mod session;

pub use prefs::{JsonFilePreferences, MemoryPreferences, PreferencesStore, Score};
pub use sequence::{Sequence, SequenceGenerator};
pub use session::{
    ChannelMode, GameSettings, GameViewModel, RoundConfig, SessionEngine, SessionError,
    SessionState,
};
