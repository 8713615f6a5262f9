//! # Amount uniquification
//!
//! On a shared merchant address the only thing that tells two orders apart is the amount paid. The uniquifier adds a
//! small random number of litoshi to each quoted amount so that concurrently open orders ask for different amounts.
//!
//! The offset range is a deployment choice. With `N` possible offsets and `n` orders open at once, the chance that two
//! of them draw the same offset is the birthday bound reported by [`AmountUniquifier::collision_probability`]. Order
//! creation also redraws against the amounts already pending on the address ([`AmountUniquifier::uniquify_avoiding`]),
//! and if two orders do end up with the same amount the matcher credits the older one first.
use std::collections::HashSet;

use lpg_common::Litoshi;
use rand::Rng;
use thiserror::Error;

/// 1 litoshi
pub const DEFAULT_MIN_OFFSET: i64 = 1;
/// 9 999 litoshi, just under 0.0001 LTC
pub const DEFAULT_MAX_OFFSET: i64 = 9_999;
const MAX_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid offset range {min}..={max}")]
pub struct InvalidOffsetRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountUniquifier {
    min_offset: i64,
    max_offset: i64,
}

impl Default for AmountUniquifier {
    fn default() -> Self {
        Self { min_offset: DEFAULT_MIN_OFFSET, max_offset: DEFAULT_MAX_OFFSET }
    }
}

impl AmountUniquifier {
    pub fn new(min_offset: i64, max_offset: i64) -> Result<Self, InvalidOffsetRange> {
        if min_offset < 0 || max_offset < min_offset {
            return Err(InvalidOffsetRange { min: min_offset, max: max_offset });
        }
        Ok(Self { min_offset, max_offset })
    }

    pub fn min_offset(&self) -> Litoshi {
        Litoshi::from(self.min_offset)
    }

    pub fn max_offset(&self) -> Litoshi {
        Litoshi::from(self.max_offset)
    }

    /// The number of distinct offsets that can be drawn.
    pub fn range_size(&self) -> u64 {
        self.max_offset.abs_diff(self.min_offset) + 1
    }

    /// Returns `base` plus a uniformly random offset from the configured range.
    pub fn uniquify(&self, base: Litoshi) -> Litoshi {
        let offset = rand::thread_rng().gen_range(self.min_offset..=self.max_offset);
        base + Litoshi::from(offset)
    }

    /// Like [`Self::uniquify`], but redraws (a bounded number of times) while the result is one of the `taken`
    /// amounts. If every draw collides, the last one is returned anyway.
    pub fn uniquify_avoiding(&self, base: Litoshi, taken: &HashSet<Litoshi>) -> Litoshi {
        let mut amount = self.uniquify(base);
        for _ in 1..MAX_ATTEMPTS {
            if !taken.contains(&amount) {
                break;
            }
            amount = self.uniquify(base);
        }
        amount
    }

    /// The probability that at least two of `n` independently uniquified amounts with the same base are equal.
    pub fn collision_probability(&self, n: u64) -> f64 {
        let size = self.range_size() as f64;
        if n as f64 > size {
            return 1.0;
        }
        let p_distinct = (0..n).fold(1.0f64, |p, i| p * (1.0 - i as f64 / size));
        1.0 - p_distinct
    }
}
