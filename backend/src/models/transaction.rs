//! Ledger entry (transaction) model
//!
//! A transaction is an atomic bilateral claim between two agents:
//! - `from` holds the claim as an asset
//! - `to` carries it as a liability
//!
//! Entries are only ever created through [`Environment::new_transaction`],
//! which registers them on both endpoint agents. The only in-place mutation
//! allowed afterwards is interest accrual.
//!
//! ```text
//!               A (from)    L (to)
//! bank          loans       deposits
//! household     deposits    labour
//! firm          labour      loans
//! ```
//!
//! [`Environment::new_transaction`]: crate::models::environment::Environment::new_transaction

use serde::{Deserialize, Serialize};
use std::fmt;

/// Duration marker for entries that live until explicitly netted
pub const OPEN_ENDED: i64 = -1;

/// Stable identifier of a ledger entry
///
/// Identifiers are handed out sequentially by the environment, so two runs
/// with the same seed and configuration produce the same identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub(crate) u64);

impl TransactionId {
    /// Raw sequence number
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx_{:08}", self.0)
    }
}

/// Vocabulary of ledger entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Promise to work (household liability, firm asset), in hours
    Labour,
    /// Bank deposit (bank liability)
    Deposits,
    /// Bank loan (bank asset)
    Loans,
    /// Delivered goods (firm liability, household asset), in units
    Goods,
    /// Residual capital difference between a household and a firm
    Capital,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Labour => "labour",
            TransactionKind::Deposits => "deposits",
            TransactionKind::Loans => "loans",
            TransactionKind::Goods => "goods",
            TransactionKind::Capital => "capital",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bilateral claim recorded on the books of exactly two agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,

    kind: TransactionKind,

    /// Free-form tag, empty for pipeline-created entries
    label: String,

    /// Asset holder
    from: String,

    /// Liability holder
    to: String,

    /// Non-negative amount (money for financial kinds, units for real kinds)
    amount: f64,

    /// Per-step rate, 0.0 when the entry does not bear interest
    interest_rate: f64,

    /// Step at which the entry was originated
    origin_time: usize,

    /// Maturity in steps; [`OPEN_ENDED`] until netted
    duration: i64,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TransactionId,
        kind: TransactionKind,
        label: String,
        from: String,
        to: String,
        amount: f64,
        interest_rate: f64,
        origin_time: usize,
        duration: i64,
    ) -> Self {
        Self {
            id,
            kind,
            label,
            from,
            to,
            amount,
            interest_rate,
            origin_time,
            duration,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn interest_rate(&self) -> f64 {
        self.interest_rate
    }

    pub fn origin_time(&self) -> usize {
        self.origin_time
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn is_open_ended(&self) -> bool {
        self.duration == OPEN_ENDED
    }

    /// Whether the agent is one of the two endpoints
    pub fn involves(&self, agent_id: &str) -> bool {
        self.from == agent_id || self.to == agent_id
    }

    /// The other endpoint, if `agent_id` is one of them
    pub fn counterparty_of(&self, agent_id: &str) -> Option<&str> {
        if self.from == agent_id {
            Some(&self.to)
        } else if self.to == agent_id {
            Some(&self.from)
        } else {
            None
        }
    }

    /// Signed amount from the agent's perspective: positive for the asset
    /// holder, negative for the liability holder, zero otherwise
    ///
    /// # Example
    /// ```
    /// use economy_simulator_core_rs::{Agent, Environment, TransactionKind};
    /// use economy_simulator_core_rs::models::{BankProfile, HouseholdProfile};
    ///
    /// let mut env = Environment::new();
    /// env.add_agent(Agent::household("H1", HouseholdProfile::new(10.0, 0.5))).unwrap();
    /// env.add_agent(Agent::bank("B1", BankProfile::new(0.0, 0.0))).unwrap();
    ///
    /// let id = env
    ///     .new_transaction(TransactionKind::Deposits, "", "H1", "B1", 50.0, 0.0, 0, -1)
    ///     .unwrap();
    /// let tx = env.transaction(id).unwrap();
    /// assert_eq!(tx.signed_amount_for("H1"), 50.0);
    /// assert_eq!(tx.signed_amount_for("B1"), -50.0);
    /// ```
    pub fn signed_amount_for(&self, agent_id: &str) -> f64 {
        if self.from == agent_id {
            self.amount
        } else if self.to == agent_id {
            -self.amount
        } else {
            0.0
        }
    }

    /// Apply one step of interest: `amount *= 1 + rate`
    pub(crate) fn accrue_interest(&mut self) {
        if self.interest_rate != 0.0 {
            self.amount *= 1.0 + self.interest_rate;
        }
    }
}
