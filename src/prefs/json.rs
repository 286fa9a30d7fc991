//! JSON file preferences
//!
//! Handles:
//! - Reading the whole document, falling back to defaults when it is
//!   missing or unreadable
//! - Read-modify-write of the document on every save; a save never replaces
//!   a document it could not read

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use super::{PreferencesStore, PrefsDocument, PrefsError, Score};
use crate::session::GameSettings;

/// Preferences persisted as one JSON document
pub struct JsonFilePreferences {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFilePreferences {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the document; a missing or broken file reads as defaults
    pub fn load(&self) -> PrefsDocument {
        match self.try_load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "error reading preferences, using defaults");
                PrefsDocument::default()
            }
        }
    }

    fn try_load(&self) -> Result<PrefsDocument, PrefsError> {
        if !self.path.exists() {
            return Ok(PrefsDocument::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(PrefsDocument::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn edit(&self, f: impl FnOnce(&mut PrefsDocument)) -> Result<(), PrefsError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.try_load().map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "preferences unreadable, save refused");
            e
        })?;
        f(&mut doc);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&doc)?)?;
        debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }
}

impl PreferencesStore for JsonFilePreferences {
    fn high_score(&self) -> Result<u32, PrefsError> {
        Ok(self.load().highscore)
    }

    fn save_high_score(&self, score: u32) -> Result<(), PrefsError> {
        self.edit(|doc| doc.highscore = score)
    }

    fn settings(&self) -> Result<GameSettings, PrefsError> {
        Ok(self.load().settings)
    }

    fn save_settings(&self, settings: &GameSettings) -> Result<(), PrefsError> {
        self.edit(|doc| doc.settings = settings.clone())
    }

    fn scores(&self) -> Result<Vec<Score>, PrefsError> {
        Ok(self.load().scores)
    }

    fn save_score(&self, score: Score) -> Result<(), PrefsError> {
        self.edit(|doc| doc.scores.push(score))
    }
}
