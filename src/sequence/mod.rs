//! Sequence Module: constrained random stimulus sequences for N-back rounds
//!
//! # Components
//! - `generator.rs`: SequenceGenerator (planted matches, collision redraws)
//!
//! A round's sequence is generated once and never mutated afterwards.

pub mod generator;

pub use generator::SequenceGenerator;

use thiserror::Error;

/// Rejections for generator arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("lag must be at least 1")]
    ZeroLag,
    #[error("sequence of {total} events is too short for lag {lag}")]
    TooShort { total: usize, lag: usize },
    #[error("cardinality must be at least 1")]
    EmptyAlphabet,
    #[error("match percentage {0} is outside 0..=100")]
    PercentageOutOfRange(u32),
}

/// An immutable round sequence together with how it was built
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    events: Vec<u32>,
    lag: usize,
    /// Matches the generator placed on purpose
    planted: usize,
    /// Eligible slots where a redraw could not avoid an accidental match
    collisions: usize,
}

impl Sequence {
    /// Wrap a fixed list of events. Every lag match counts as planted.
    pub fn from_events(events: Vec<u32>, lag: usize) -> Self {
        let mut sequence = Sequence {
            events,
            lag,
            planted: 0,
            collisions: 0,
        };
        sequence.planted = sequence.match_count();
        sequence
    }

    pub fn events(&self) -> &[u32] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.events.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn lag(&self) -> usize {
        self.lag
    }

    pub fn planted(&self) -> usize {
        self.planted
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Number of positions that can hold a match (index >= lag)
    pub fn eligible(&self) -> usize {
        self.events.len().saturating_sub(self.lag)
    }

    /// True when `events[index] == events[index - lag]`
    pub fn is_match(&self, index: usize) -> bool {
        index >= self.lag
            && index < self.events.len()
            && self.events[index] == self.events[index - self.lag]
    }

    /// Count of eligible positions that equal the value `lag` steps back
    pub fn match_count(&self) -> usize {
        (self.lag..self.events.len())
            .filter(|&i| self.is_match(i))
            .count()
    }
}
