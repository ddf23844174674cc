//! Settlement Module
//!
//! Booking and consolidation of ledger entries:
//! - **Triad settlement**: every market trade becomes a factor entry plus a
//!   deposit and a loan at a bank (see [`triad`])
//! - **Bilateral netting**: all entries of chosen kinds between two agents
//!   collapse into at most one (see [`netting`])
//!
//! # Critical Invariants
//!
//! 1. **Atomicity**: a triad is created whole or not at all
//! 2. **Conservation**: neither settlement nor netting changes any agent's
//!    net worth at current prices
//! 3. **Exactness**: a netted balance is the plain sum of the removed
//!    entries' signed values, with no snapping to zero

pub mod netting;
pub mod triad;

pub use netting::{net_bilateral, NetOutcome, NettingRule, NettingTerm, Replacement, Side};
pub use triad::{settle_through_bank, Triad};
