//! xorshift64* random number generator
//!
//! Small, fast and fully deterministic: the same seed always yields the same
//! sequence, so a run can be replayed bit-for-bit from its seed. The update
//! pipeline uses it to pick the settling bank for each trade.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use economy_simulator_core_rs::RngManager;
///
/// let banks = ["BANK_1", "BANK_2", "BANK_3"];
/// let mut rng = RngManager::new(12345);
/// let chosen = rng.choose(&banks).unwrap();
/// assert!(banks.contains(chosen));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a generator from a seed (zero is mapped to one, xorshift
    /// cannot leave the all-zero state)
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Next raw 64-bit value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform index in `[0, len)`, or None when `len == 0`
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some((self.next() % len as u64) as usize)
    }

    /// Uniform choice from a slice, or None when it is empty
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        self.index(items.len()).map(|i| &items[i])
    }

    /// Current state, enough to resume the exact sequence later
    pub fn get_state(&self) -> u64 {
        self.state
    }
}
