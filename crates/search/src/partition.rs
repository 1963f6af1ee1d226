//! Nonce-domain partitioning.

use std::ops::Range;

use crate::api::Nonce;
use crate::error::ConfigError;

/// Half-open slice `[low, high)` of the nonce domain, owned by exactly one worker.
///
/// Bounds are `u64` so that the last subrange of the full 32-bit domain can end at `2^32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subrange {
    low: u64,
    high: u64,
}

impl Subrange {
    /// Build `[low, high)`. An inverted pair yields an empty subrange at `low`.
    pub fn new(low: u64, high: u64) -> Self {
        Self {
            low,
            high: high.max(low),
        }
    }

    /// Inclusive lower bound.
    pub fn low(&self) -> u64 {
        self.low
    }

    /// Exclusive upper bound.
    pub fn high(&self) -> u64 {
        self.high
    }

    /// Number of nonces in the subrange.
    pub fn len(&self) -> u64 {
        self.high - self.low
    }

    /// Whether the subrange holds no nonce.
    pub fn is_empty(&self) -> bool {
        self.low == self.high
    }

    /// Whether `nonce` falls inside the subrange.
    pub fn contains(&self, nonce: Nonce) -> bool {
        (self.low..self.high).contains(&u64::from(nonce))
    }

    /// The subrange as a `u64` range.
    pub fn as_range(&self) -> Range<u64> {
        self.low..self.high
    }
}

/// Split `[0, max_nonce]` into `worker_count` disjoint subranges covering it exactly once.
///
/// With `step = max_nonce / worker_count`, worker `i` gets `[i*step, (i+1)*step)` and the last
/// worker gets `[(worker_count-1)*step, max_nonce]`, absorbing the remainder. Leading subranges
/// are empty when `worker_count > max_nonce`.
pub fn partition(max_nonce: Nonce, worker_count: usize) -> Result<Vec<Subrange>, ConfigError> {
    if worker_count == 0 {
        return Err(ConfigError::ZeroWorkers);
    }
    if max_nonce == 0 && worker_count > 1 {
        return Err(ConfigError::DegenerateDomain {
            workers: worker_count,
        });
    }

    let end = u64::from(max_nonce) + 1;
    let count = worker_count as u64;
    let step = u64::from(max_nonce) / count;

    let mut ranges = Vec::with_capacity(worker_count);
    for idx in 0..count {
        let low = idx.saturating_mul(step).min(end);
        let high = if idx + 1 == count {
            end
        } else {
            (idx + 1).saturating_mul(step).min(end)
        };
        ranges.push(Subrange::new(low, high));
    }
    Ok(ranges)
}
