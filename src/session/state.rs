//! Session state snapshot
//!
//! Maintains:
//! - Engine phase (idle, running, finished)
//! - Current event index and the stimulus shown on each channel
//! - Feedback text and per-channel correct counts
//!
//! Only the engine writes a `SessionState`; observers get clones.

use std::fmt;

use super::config::ChannelMode;
use super::speech::letter_for;

/// Engine lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Finished => "finished",
        })
    }
}

/// Published view of round progress
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub channel_mode: ChannelMode,
    /// Events fully shown so far; never decreases within a round
    pub current_event_index: usize,
    pub total_events: usize,
    /// Grid position on screen, if the visual channel is showing one
    pub visual_value: Option<u32>,
    /// Event value behind the spoken letter, if the audio channel is active
    pub audio_value: Option<u32>,
    pub spoken_letters: u32,
    pub feedback: String,
    pub correct_visual_responses: u32,
    pub correct_audio_responses: u32,
    pub round_finished: bool,
}

impl SessionState {
    /// Idle snapshot for a channel mode
    pub fn idle(channel_mode: ChannelMode) -> Self {
        SessionState {
            channel_mode,
            ..SessionState::default()
        }
    }

    /// Visual value as the display layer sees it, -1 when nothing is shown
    pub fn event_value(&self) -> i64 {
        self.visual_value.map(i64::from).unwrap_or(-1)
    }

    /// Letter being spoken this tick
    pub fn audio_letter(&self) -> Option<&'static str> {
        self.audio_value
            .map(|value| letter_for(value, self.spoken_letters))
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }
}
