//! SequenceGenerator: N-back sequences with a target match rate
//!
//! Features:
//! - Planted matches spread by remaining quota over remaining eligible slots
//! - Non-planted slots redrawn until they differ from the value `lag` back
//! - Seedable random source for reproducible rounds

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Sequence, SequenceError};

/// Redraw attempts before an accidental match is accepted
const MAX_REDRAWS: usize = 32;

/// Builds round sequences from a random source
#[derive(Clone, Debug)]
pub struct SequenceGenerator<R: Rng = StdRng> {
    rng: R,
}

impl SequenceGenerator<StdRng> {
    /// Generator seeded from OS entropy
    pub fn from_entropy() -> Self {
        SequenceGenerator {
            rng: StdRng::from_entropy(),
        }
    }

    /// Same seed, same sequences
    pub fn seeded(seed: u64) -> Self {
        SequenceGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> SequenceGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        SequenceGenerator { rng }
    }

    /// Number of matches a round should carry:
    /// `round((total - lag) * percentage / 100)`
    pub fn target_matches(total_events: usize, lag: usize, percentage: u32) -> usize {
        let eligible = total_events.saturating_sub(lag);
        (eligible * percentage as usize + 50) / 100
    }

    /// Generate `total_events` values in `[0, cardinality)`
    pub fn generate(
        &mut self,
        total_events: usize,
        cardinality: u32,
        match_percentage: u32,
        lag: usize,
    ) -> Result<Sequence, SequenceError> {
        if lag == 0 {
            return Err(SequenceError::ZeroLag);
        }
        if total_events <= lag {
            return Err(SequenceError::TooShort {
                total: total_events,
                lag,
            });
        }
        if cardinality == 0 {
            return Err(SequenceError::EmptyAlphabet);
        }
        if match_percentage > 100 {
            return Err(SequenceError::PercentageOutOfRange(match_percentage));
        }

        let mut quota = Self::target_matches(total_events, lag, match_percentage);
        let mut events = Vec::with_capacity(total_events);
        let mut planted = 0;
        let mut collisions = 0;

        for i in 0..total_events {
            if i < lag {
                events.push(self.rng.gen_range(0..cardinality));
                continue;
            }

            let previous = events[i - lag];
            let slots_left = total_events - i;

            // quota == slots_left forces a plant, quota == 0 forbids one
            let plant = quota > 0 && self.rng.gen_range(0..slots_left) < quota;
            if plant {
                events.push(previous);
                planted += 1;
                quota -= 1;
                continue;
            }

            let mut value = self.rng.gen_range(0..cardinality);
            let mut redraws = 0;
            while value == previous && redraws < MAX_REDRAWS {
                value = self.rng.gen_range(0..cardinality);
                redraws += 1;
            }
            if value == previous {
                collisions += 1;
            }
            events.push(value);
        }

        Ok(Sequence {
            events,
            lag,
            planted,
            collisions,
        })
    }
}

impl Default for SequenceGenerator<StdRng> {
    fn default() -> Self {
        Self::from_entropy()
    }
}
