//! Running total of model counts
//!
//! Counts arrive as decimal strings and can exceed any machine integer, so
//! they are summed as `BigUint`. Big-integer addition is not atomic; every
//! addition goes through one mutex.

use std::str::FromStr;
use std::sync::Mutex;

use num_bigint::BigUint;
use num_traits::Zero;
use thiserror::Error;

/// Accumulates per-cube counts into an exact total
#[derive(Debug)]
pub struct Aggregator {
    total: Mutex<BigUint>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            total: Mutex::new(BigUint::zero()),
        }
    }

    /// Add a count to the running total
    pub fn add(&self, count: &BigUint) {
        let mut total = self.lock();
        *total += count;
    }

    /// Current running total
    pub fn total(&self) -> BigUint {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BigUint> {
        self.total.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parse a worker-reported count.
///
/// Accepts only ASCII decimal digits after trimming surrounding whitespace;
/// signs, separators and empty strings are rejected.
pub fn parse_count(raw: &str) -> Result<BigUint, MalformedCount> {
    let digits = raw.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedCount {
            raw: raw.to_string(),
        });
    }
    BigUint::from_str(digits).map_err(|_| MalformedCount {
        raw: raw.to_string(),
    })
}

/// A count payload that is not a non-negative decimal integer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed count payload '{raw}'")]
pub struct MalformedCount {
    pub raw: String,
}
