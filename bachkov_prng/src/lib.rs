// Deterministic, portable pseudo-random number generator for Markov walks.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// The generator has no external dependencies and produces identical output
// on every platform, so a walk over a trained chain is reproducible from its
// seed alone.
//
// The only sampling primitive the chorale generator needs is a weighted
// choice over integer follower counts (`weighted_index`). It stays in
// integer arithmetic end to end: no floating-point cumulative sums, so two
// builds can never disagree about which follower a given draw selects.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Xoshiro256++ state used to drive a single walk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalkRng {
    s: [u64; 4],
}

impl WalkRng {
    /// Create a generator from a `u64` seed.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Create a generator seeded from the wall clock and process id.
    ///
    /// Returns the seed alongside the generator so callers can log it and
    /// replay the same walk later.
    pub fn from_entropy() -> (Self, u64) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut mix = nanos ^ ((std::process::id() as u64) << 32);
        let seed = splitmix64(&mut mix);
        (Self::new(seed), seed)
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform integer in `[0, bound)` without modulo bias.
    ///
    /// Panics if `bound == 0`.
    pub fn below(&mut self, bound: u64) -> u64 {
        assert!(bound > 0, "below: bound must be positive");
        if bound.is_power_of_two() {
            return self.next_u64() & (bound - 1);
        }
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return r % bound;
            }
        }
    }

    /// Pick an index with probability proportional to its weight.
    ///
    /// Returns `None` when the slice is empty or every weight is zero.
    pub fn weighted_index(&mut self, weights: &[u64]) -> Option<usize> {
        let total = weights
            .iter()
            .try_fold(0u64, |acc, &w| acc.checked_add(w))?;
        if total == 0 {
            return None;
        }
        let mut target = self.below(total);
        for (i, &w) in weights.iter().enumerate() {
            if target < w {
                return Some(i);
            }
            target -= w;
        }
        None
    }
}

/// SplitMix64, used only for seeding.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_walk() {
        let mut a = WalkRng::new(42);
        let mut b = WalkRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = WalkRng::new(42);
        let mut b = WalkRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn below_within_bounds() {
        let mut rng = WalkRng::new(999);
        for _ in 0..10_000 {
            let v = rng.below(7);
            assert!(v < 7, "below out of range: {v}");
        }
    }

    #[test]
    fn weighted_index_skips_zero_weights() {
        let mut rng = WalkRng::new(7);
        for _ in 0..1000 {
            let i = rng.weighted_index(&[0, 3, 0, 1]).unwrap();
            assert!(i == 1 || i == 3, "picked zero-weight index {i}");
        }
    }

    #[test]
    fn weighted_index_degenerate_inputs() {
        let mut rng = WalkRng::new(7);
        assert_eq!(rng.weighted_index(&[]), None);
        assert_eq!(rng.weighted_index(&[0, 0]), None);
        assert_eq!(rng.weighted_index(&[5]), Some(0));
    }

    #[test]
    fn weighted_index_roughly_proportional() {
        let mut rng = WalkRng::new(12345);
        let mut counts = [0u32; 2];
        for _ in 0..10_000 {
            counts[rng.weighted_index(&[1, 3]).unwrap()] += 1;
        }
        let pct = counts[1] as f64 / 10_000.0;
        assert!((0.70..0.80).contains(&pct), "expected ~75%, got {pct}");
    }

    #[test]
    fn serialization_roundtrip_continues_sequence() {
        let mut rng = WalkRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: WalkRng = serde_json::from_str(&json).unwrap();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
