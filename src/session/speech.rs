//! Speech hook for the audio channel
//!
//! The engine never synthesizes speech. It asks a `Speaker` once per tick to
//! say the letter for the current event and does not wait on it beyond the
//! round interval.

use super::errors::SpeakError;

/// Distinct letters the audio channel can speak
pub const ALPHABET: [&str; 16] = [
    "L", "I", "B", "A", "N", "F", "G", "H", "K", "M", "P", "R", "S", "T", "C", "Q",
];

/// Letter spoken for an event value with `letters` symbols in play
pub fn letter_for(value: u32, letters: u32) -> &'static str {
    let letters = letters.clamp(1, ALPHABET.len() as u32);
    ALPHABET[(value % letters) as usize]
}

/// External speech output
pub trait Speaker: Send + Sync {
    /// Polled before an audio round starts; the round waits until true
    fn is_ready(&self) -> bool {
        true
    }

    /// Say `symbol`. Runs on the blocking pool; the round moves on when the
    /// interval ends even if this has not returned.
    fn speak(&self, symbol: &str) -> Result<(), SpeakError>;
}

/// Speaker that says nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentSpeaker;

impl Speaker for SilentSpeaker {
    fn speak(&self, _symbol: &str) -> Result<(), SpeakError> {
        Ok(())
    }
}
