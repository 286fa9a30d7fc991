//! Claim tracking per stimulus channel
//!
//! Features:
//! - Correct / incorrect counts per channel
//! - At most one scored claim per channel per event index
//! - Accuracy summary for the end-of-round report

use rustc_hash::FxHashSet;

/// A stimulus channel a claim is made on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Visual,
    Audio,
}

impl Channel {
    pub fn label(self) -> &'static str {
        match self {
            Channel::Visual => "Visual",
            Channel::Audio => "Audio",
        }
    }

    fn slot(self) -> usize {
        match self {
            Channel::Visual => 0,
            Channel::Audio => 1,
        }
    }
}

/// Result of recording one claim
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Correct,
    Incorrect,
    /// Channel already claimed at this index; nothing changed
    Duplicate,
}

impl ClaimOutcome {
    /// Feedback line for a scored claim
    pub fn feedback(self, channel: Channel) -> Option<String> {
        match self {
            ClaimOutcome::Correct => Some(format!("{} Correct!", channel.label())),
            ClaimOutcome::Incorrect => Some(format!("{} Incorrect!", channel.label())),
            ClaimOutcome::Duplicate => None,
        }
    }
}

/// Per-round claim bookkeeping
#[derive(Clone, Debug, Default)]
pub struct ClaimTally {
    correct: [u32; 2],
    incorrect: [u32; 2],
    claimed: FxHashSet<(Channel, usize)>,
}

impl ClaimTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a claim on `channel` at event `index`
    pub fn record(&mut self, channel: Channel, index: usize, correct: bool) -> ClaimOutcome {
        if !self.claimed.insert((channel, index)) {
            return ClaimOutcome::Duplicate;
        }

        if correct {
            self.correct[channel.slot()] += 1;
            ClaimOutcome::Correct
        } else {
            self.incorrect[channel.slot()] += 1;
            ClaimOutcome::Incorrect
        }
    }

    pub fn correct(&self, channel: Channel) -> u32 {
        self.correct[channel.slot()]
    }

    pub fn incorrect(&self, channel: Channel) -> u32 {
        self.incorrect[channel.slot()]
    }

    /// Correct claims across both channels
    pub fn score(&self) -> u32 {
        self.correct.iter().sum()
    }

    /// Summary for the finished round
    pub fn stats(&self) -> TallyStats {
        TallyStats {
            score: self.score(),
            visual_correct: self.correct(Channel::Visual),
            visual_incorrect: self.incorrect(Channel::Visual),
            audio_correct: self.correct(Channel::Audio),
            audio_incorrect: self.incorrect(Channel::Audio),
        }
    }

    /// Clear all claims (for starting a new round)
    pub fn reset(&mut self) {
        self.correct = [0; 2];
        self.incorrect = [0; 2];
        self.claimed.clear();
    }
}

/// Summary statistics for a round's claims
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TallyStats {
    pub score: u32,
    pub visual_correct: u32,
    pub visual_incorrect: u32,
    pub audio_correct: u32,
    pub audio_incorrect: u32,
}
