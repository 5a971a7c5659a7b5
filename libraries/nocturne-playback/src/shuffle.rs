//! Shuffle picks for the `Normal` shuffle mode
//!
//! Picks are drawn one at a time by rejection sampling. A draw is rejected
//! when it repeats the previous pick, or when it lands on a non-favorite
//! candidate that already appears in the play history.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random index source that never repeats its previous draw
#[derive(Debug)]
pub struct Shuffler {
    rng: StdRng,
    previous: Option<usize>,
}

impl Shuffler {
    /// Create a shuffler seeded from the OS
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            previous: None,
        }
    }

    /// Create a deterministic shuffler (tests, reproducible sessions)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            previous: None,
        }
    }

    /// Last successful draw
    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    /// Pick an index in `[0, candidate_count)`
    ///
    /// `in_history(i)` and `is_favorite(i)` describe candidate `i`.
    /// Favorites are exempt from the history ban. When every candidate is
    /// banned the history rule is dropped rather than looping forever.
    ///
    /// Returns `None` only when there are no candidates.
    pub fn pick<H, F>(&mut self, candidate_count: usize, in_history: H, is_favorite: F) -> Option<usize>
    where
        H: Fn(usize) -> bool,
        F: Fn(usize) -> bool,
    {
        if candidate_count == 0 {
            return None;
        }

        let repeats_previous = |index: usize| candidate_count > 1 && Some(index) == self.previous;
        let eligible = |index: usize| is_favorite(index) || !in_history(index);

        let honor_history =
            (0..candidate_count).any(|index| eligible(index) && !repeats_previous(index));
        if !honor_history {
            tracing::debug!(candidate_count, "Every shuffle candidate already played");
        }

        let pick = loop {
            let draw = self.rng.gen_range(0..candidate_count);
            if repeats_previous(draw) {
                continue;
            }
            if honor_history && !eligible(draw) {
                continue;
            }
            break draw;
        };

        self.previous = Some(pick);
        Some(pick)
    }
}

impl Default for Shuffler {
    fn default() -> Self {
        Self::new()
    }
}
