//! View-model seam between the engine and a front-end
//!
//! `GameViewModel` is what a UI talks to. `SessionEngine` is the real one;
//! `FakeViewModel` answers with fixed values for UI work without a running
//! round.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::config::{ChannelMode, GameSettings};
use super::engine::{ClaimReport, SessionEngine};
use super::errors::SessionError;
use super::speech::Speaker;
use super::state::SessionState;
use crate::prefs::Score;

pub trait GameViewModel: Send + Sync {
    fn game_state(&self) -> watch::Receiver<SessionState>;
    fn score(&self) -> watch::Receiver<u32>;
    fn high_score(&self) -> watch::Receiver<u32>;
    fn settings(&self) -> watch::Receiver<GameSettings>;
    fn n_back(&self) -> usize;
    fn event_interval(&self) -> Duration;
    fn total_events(&self) -> usize;
    fn set_channel_mode(&self, mode: ChannelMode) -> Result<(), SessionError>;
    fn start(&self, speaker: Arc<dyn Speaker>) -> Result<(), SessionError>;
    fn check_match(&self, selected: Option<u32>) -> Result<ClaimReport, SessionError>;
    fn reset_game(&self);
    fn record_score(&self, player_name: &str) -> Result<Score, SessionError>;
}

impl GameViewModel for SessionEngine {
    fn game_state(&self) -> watch::Receiver<SessionState> {
        SessionEngine::game_state(self)
    }

    fn score(&self) -> watch::Receiver<u32> {
        SessionEngine::score(self)
    }

    fn high_score(&self) -> watch::Receiver<u32> {
        SessionEngine::high_score(self)
    }

    fn settings(&self) -> watch::Receiver<GameSettings> {
        SessionEngine::settings(self)
    }

    fn n_back(&self) -> usize {
        self.config().lag
    }

    fn event_interval(&self) -> Duration {
        self.config().interval
    }

    fn total_events(&self) -> usize {
        self.config().total_events
    }

    fn set_channel_mode(&self, mode: ChannelMode) -> Result<(), SessionError> {
        SessionEngine::set_channel_mode(self, mode)
    }

    fn start(&self, speaker: Arc<dyn Speaker>) -> Result<(), SessionError> {
        SessionEngine::start(self, speaker)
    }

    fn check_match(&self, selected: Option<u32>) -> Result<ClaimReport, SessionError> {
        SessionEngine::check_match(self, selected)
    }

    fn reset_game(&self) {
        SessionEngine::reset_game(self)
    }

    fn record_score(&self, player_name: &str) -> Result<Score, SessionError> {
        SessionEngine::record_score(self, player_name)
    }
}

/// Fixed-response view model: score 2, highscore 42, default settings
pub struct FakeViewModel {
    state: watch::Sender<SessionState>,
    score: watch::Sender<u32>,
    high_score: watch::Sender<u32>,
    settings: watch::Sender<GameSettings>,
}

impl FakeViewModel {
    pub fn new() -> Self {
        let settings = GameSettings::default();
        FakeViewModel {
            state: watch::Sender::new(SessionState {
                total_events: settings.num_events as usize,
                spoken_letters: settings.num_spoken_letters,
                ..SessionState::default()
            }),
            score: watch::Sender::new(2),
            high_score: watch::Sender::new(42),
            settings: watch::Sender::new(settings),
        }
    }
}

impl Default for FakeViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GameViewModel for FakeViewModel {
    fn game_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn score(&self) -> watch::Receiver<u32> {
        self.score.subscribe()
    }

    fn high_score(&self) -> watch::Receiver<u32> {
        self.high_score.subscribe()
    }

    fn settings(&self) -> watch::Receiver<GameSettings> {
        self.settings.subscribe()
    }

    fn n_back(&self) -> usize {
        2
    }

    fn event_interval(&self) -> Duration {
        Duration::from_millis(2000)
    }

    fn total_events(&self) -> usize {
        20
    }

    fn set_channel_mode(&self, mode: ChannelMode) -> Result<(), SessionError> {
        self.state.send_modify(|state| state.channel_mode = mode);
        Ok(())
    }

    fn start(&self, _speaker: Arc<dyn Speaker>) -> Result<(), SessionError> {
        Ok(())
    }

    fn check_match(&self, _selected: Option<u32>) -> Result<ClaimReport, SessionError> {
        Ok(ClaimReport::default())
    }

    fn reset_game(&self) {}

    fn record_score(&self, player_name: &str) -> Result<Score, SessionError> {
        Ok(Score {
            player_name: player_name.to_string(),
            score: *self.score.borrow(),
            timestamp_millis: 0,
        })
    }
}
