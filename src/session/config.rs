//! Round configuration
//!
//! Maintains:
//! - Channel mode (which stimulus channels run each tick)
//! - Persisted game settings with their defaults
//! - Per-round config derived from settings, validated before a round starts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::errors::SessionError;
use super::speech::ALPHABET;

/// Match rate the trainer plants into every generated round
pub const DEFAULT_MATCH_PERCENTAGE: u32 = 30;

/// Which stimulus channels are active
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelMode {
    #[default]
    Visual,
    Audio,
    AudioVisual,
}

impl ChannelMode {
    pub fn visual(self) -> bool {
        matches!(self, ChannelMode::Visual | ChannelMode::AudioVisual)
    }

    pub fn audio(self) -> bool {
        matches!(self, ChannelMode::Audio | ChannelMode::AudioVisual)
    }

    /// Next mode in Visual → Audio → AudioVisual order
    pub fn cycle(self) -> Self {
        match self {
            ChannelMode::Visual => ChannelMode::Audio,
            ChannelMode::Audio => ChannelMode::AudioVisual,
            ChannelMode::AudioVisual => ChannelMode::Visual,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChannelMode::Visual => "Visual",
            ChannelMode::Audio => "Audio",
            ChannelMode::AudioVisual => "Audio-Visual",
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChannelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "visual" | "v" => Ok(ChannelMode::Visual),
            "audio" | "a" => Ok(ChannelMode::Audio),
            "audiovisual" | "audio-visual" | "dual" | "av" => Ok(ChannelMode::AudioVisual),
            other => Err(format!("unknown channel mode: {}", other)),
        }
    }
}

/// Game settings owned by the preferences store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub num_events: u32,
    #[serde(rename = "time_between_events")]
    pub time_between_events_ms: u32,
    pub n_back: u32,
    pub grid_size: u32,
    pub num_spoken_letters: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            num_events: 20,
            time_between_events_ms: 2000,
            n_back: 2,
            grid_size: 3,
            num_spoken_letters: 9,
        }
    }
}

impl GameSettings {
    /// Largest grid edge; cells are picked with the keys 1-9
    pub const MAX_GRID_SIZE: u32 = 9;

    /// Bounds the terminal front-end can render
    pub fn validate(&self) -> Result<(), SessionError> {
        if !(2..=Self::MAX_GRID_SIZE).contains(&self.grid_size) {
            return Err(SessionError::InvalidConfig(format!(
                "grid size must be within 2..={}, got {}",
                Self::MAX_GRID_SIZE,
                self.grid_size
            )));
        }
        Ok(())
    }
}

/// Immutable parameters of one round
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundConfig {
    /// N: how many steps back a match looks
    pub lag: usize,
    pub total_events: usize,
    /// Distinct visual positions (grid_size²)
    pub cardinality: u32,
    pub target_match_percentage: u32,
    pub interval: Duration,
    pub channel_mode: ChannelMode,
    /// Letters the audio channel draws from
    pub spoken_letters: u32,
}

impl RoundConfig {
    pub fn from_settings(settings: &GameSettings, channel_mode: ChannelMode) -> Self {
        RoundConfig {
            lag: settings.n_back as usize,
            total_events: settings.num_events as usize,
            cardinality: settings.grid_size.saturating_mul(settings.grid_size),
            target_match_percentage: DEFAULT_MATCH_PERCENTAGE,
            interval: Duration::from_millis(u64::from(settings.time_between_events_ms)),
            channel_mode,
            spoken_letters: settings.num_spoken_letters,
        }
    }

    /// Check round bounds; every failure is an `InvalidConfig`
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.lag == 0 {
            return Err(SessionError::InvalidConfig("lag must be at least 1".into()));
        }
        if self.total_events <= self.lag {
            return Err(SessionError::InvalidConfig(format!(
                "total events ({}) must exceed lag ({})",
                self.total_events, self.lag
            )));
        }
        if self.cardinality < 2 {
            return Err(SessionError::InvalidConfig(format!(
                "cardinality must be at least 2, got {}",
                self.cardinality
            )));
        }
        if self.target_match_percentage > 100 {
            return Err(SessionError::InvalidConfig(format!(
                "match percentage must be within 0..=100, got {}",
                self.target_match_percentage
            )));
        }
        if self.interval.is_zero() {
            return Err(SessionError::InvalidConfig(
                "interval must be greater than zero".into(),
            ));
        }
        if self.spoken_letters == 0 || self.spoken_letters as usize > ALPHABET.len() {
            return Err(SessionError::InvalidConfig(format!(
                "spoken letters must be within 1..={}, got {}",
                ALPHABET.len(),
                self.spoken_letters
            )));
        }
        Ok(())
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self::from_settings(&GameSettings::default(), ChannelMode::default())
    }
}
