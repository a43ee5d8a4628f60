//! Dice for random fault injection.
//!
//! A seed makes a run of random failures replayable: two configs built from
//! the same seed fail the same operations in the same order.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Shared, optionally seeded source of failure decisions
pub struct MockRng {
    dice: Mutex<ChaCha8Rng>,
    seed: Option<u64>,
}

impl MockRng {
    /// Seeded when `seed` is given, from OS entropy otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        let dice = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self {
            dice: Mutex::new(dice),
            seed,
        }
    }

    /// Seed this generator was built from, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Roll once: `true` with probability `rate`.
    ///
    /// Rates outside `(0, 1)` are decided without consuming a roll, so a
    /// disabled failure rate never perturbs a seeded sequence.
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 || rate.is_nan() {
            false
        } else if rate >= 1.0 {
            true
        } else {
            self.dice.lock().gen_bool(rate)
        }
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
