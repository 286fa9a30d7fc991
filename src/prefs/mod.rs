//! Preferences Module: highscore, game settings and scoreboard storage
//!
//! # Components
//! - `mod.rs`: PreferencesStore trait, Score, in-memory store
//! - `json.rs`: JSON file store used by the terminal trainer
//!
//! The session engine only sees the trait; how values are persisted is up to
//! the implementation.

pub mod json;

pub use json::JsonFilePreferences;

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

use crate::session::GameSettings;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("preferences I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("preferences document is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// One scoreboard entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    #[serde(rename = "playerName")]
    pub player_name: String,
    pub score: u32,
    /// Unix time in milliseconds
    #[serde(rename = "date")]
    pub timestamp_millis: u64,
}

/// Everything a store persists
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefsDocument {
    pub highscore: u32,
    #[serde(flatten)]
    pub settings: GameSettings,
    pub scores: Vec<Score>,
}

/// Key-value collaborator the engine reads settings from and writes scores to
pub trait PreferencesStore: Send + Sync {
    fn high_score(&self) -> Result<u32, PrefsError>;

    fn save_high_score(&self, score: u32) -> Result<(), PrefsError>;

    fn settings(&self) -> Result<GameSettings, PrefsError>;

    fn save_settings(&self, settings: &GameSettings) -> Result<(), PrefsError>;

    fn scores(&self) -> Result<Vec<Score>, PrefsError>;

    fn save_score(&self, score: Score) -> Result<(), PrefsError>;
}

/// Store that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    document: Mutex<PrefsDocument>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut PrefsDocument) -> T) -> T {
        let mut guard = self.document.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl PreferencesStore for MemoryPreferences {
    fn high_score(&self) -> Result<u32, PrefsError> {
        Ok(self.with(|doc| doc.highscore))
    }

    fn save_high_score(&self, score: u32) -> Result<(), PrefsError> {
        self.with(|doc| doc.highscore = score);
        Ok(())
    }

    fn settings(&self) -> Result<GameSettings, PrefsError> {
        Ok(self.with(|doc| doc.settings.clone()))
    }

    fn save_settings(&self, settings: &GameSettings) -> Result<(), PrefsError> {
        self.with(|doc| doc.settings = settings.clone());
        Ok(())
    }

    fn scores(&self) -> Result<Vec<Score>, PrefsError> {
        Ok(self.with(|doc| doc.scores.clone()))
    }

    fn save_score(&self, score: Score) -> Result<(), PrefsError> {
        self.with(|doc| doc.scores.push(score));
        Ok(())
    }
}

/// Scores sorted best first, ties broken by earlier date
pub fn leaderboard(mut scores: Vec<Score>, limit: usize) -> Vec<Score> {
    scores.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.timestamp_millis.cmp(&b.timestamp_millis))
    });
    scores.truncate(limit);
    scores
}
