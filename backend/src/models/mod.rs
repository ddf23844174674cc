//! Domain models for the economy simulator

pub mod agent;
pub mod environment;
pub mod event;
pub mod transaction;

// Re-exports
pub use agent::{
    cobb_douglas, Agent, AgentRole, BankProfile, Behaviour, DemandsLabour, FirmProfile,
    HouseholdProfile, Intermediates, ProducesGoods, SuppliesLabour,
};
pub use environment::{Environment, LedgerError, PRICE_OF_GOODS, PRICE_OF_LABOUR};
pub use event::{Event, EventLog, MarketKind, Stage};
pub use transaction::{Transaction, TransactionId, TransactionKind, OPEN_ENDED};
