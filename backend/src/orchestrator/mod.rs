//! Orchestrator - step loop
//!
//! - [`updater`]: the fixed per-step pipeline over an environment
//! - [`engine`]: configuration, validation and the run driver
//! - [`checkpoint`]: ledger snapshots and SHA256 digests

pub mod checkpoint;
pub mod engine;
pub mod updater;

// Re-export main types for convenience
pub use engine::{BankConfig, FirmConfig, HouseholdConfig, Orchestrator, SimulationConfig, SimulationError};
pub use updater::{NettingSummary, StepReport, Updater, UpdaterConfig};

// Re-export checkpoint types
pub use checkpoint::{compute_config_hash, compute_ledger_digest, EntrySnapshot, LedgerSnapshot};
