//! Economy Simulator Core - Rust Engine
//!
//! Per-step update engine of a discrete-time agent-based economy with
//! households, firms and banks.
//!
//! # Architecture
//!
//! - **models**: Domain types (Agent, Transaction, Environment, Event)
//! - **market**: Equilibrium price search and rationing
//! - **settlement**: Triad settlement through banks, bilateral netting
//! - **orchestrator**: Update pipeline and run driver
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Every ledger entry sits on the books of exactly its two endpoints
//! 2. Settlement and netting never change any agent's net worth
//! 3. All randomness is deterministic (seeded RNG)

// Module declarations
pub mod market;
pub mod models;
pub mod orchestrator;
pub mod rng;
pub mod settlement;

// Re-exports for convenience
pub use market::{Market, MarketClearing, MarketError, SearchParams};
pub use models::{
    agent::{Agent, AgentRole},
    environment::{Environment, LedgerError},
    event::{Event, EventLog},
    transaction::{Transaction, TransactionId, TransactionKind},
};
pub use orchestrator::{Orchestrator, SimulationConfig, SimulationError, StepReport, Updater, UpdaterConfig};
pub use rng::RngManager;
