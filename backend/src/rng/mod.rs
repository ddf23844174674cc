//! Deterministic random number generation
//!
//! All randomness in a run (currently only the settling-bank choice) goes
//! through a single [`RngManager`] seeded once from configuration.

mod xorshift;

pub use xorshift::RngManager;
