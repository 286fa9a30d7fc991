//! Session Management: round configuration, state, and the timed engine
//!
//! # Components
//! - `config.rs`: ChannelMode, GameSettings, RoundConfig
//! - `state.rs`: SessionState snapshot published to observers
//! - `tally.rs`: Per-channel claim tracking
//! - `engine.rs`: SessionEngine driving the timed rounds
//! - `speech.rs`: Speaker hook for the audio channel
//! - `view.rs`: GameViewModel trait and its fake
//! - `errors.rs`: SessionError and SpeakError

pub mod config;
pub mod engine;
pub mod errors;
pub mod speech;
pub mod state;
pub mod tally;
pub mod view;

pub use config::{ChannelMode, GameSettings, RoundConfig};
pub use engine::{ClaimReport, SessionEngine};
pub use errors::{SessionError, SpeakError};
pub use speech::{SilentSpeaker, Speaker};
pub use state::{Phase, SessionState};
pub use tally::{Channel, ClaimOutcome};
pub use view::{FakeViewModel, GameViewModel};
