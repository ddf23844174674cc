//! Environment
//!
//! Owns the agent population, the ledger and the run-level parameters.
//!
//! # Critical Invariants
//!
//! 1. **Two-sided references**: every live entry appears exactly once in the
//!    accounts of each of its two endpoint agents, and nowhere else
//! 2. **Single factory**: entries are only created by [`Environment::new_transaction`]
//! 3. **Atomic removal**: removing an entry detaches it from both agents
//! 4. **Disjoint roles**: an agent id belongs to exactly one of households,
//!    firms or banks

use crate::models::agent::{Agent, AgentRole};
use crate::models::transaction::{Transaction, TransactionId, TransactionKind};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Parameter key under which the cleared wage is stored
pub const PRICE_OF_LABOUR: &str = "price_of_labour";

/// Parameter key under which the goods price is stored
pub const PRICE_OF_GOODS: &str = "price_of_goods";

/// Errors raised by ledger and population operations
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Agent not found: {0}")]
    UnknownAgent(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Transaction not found: {0}")]
    UnknownTransaction(TransactionId),

    #[error("Agent {0} cannot hold a claim on itself")]
    SelfTransaction(String),

    #[error("Invalid {kind} amount {amount}: must be finite and non-negative")]
    InvalidAmount { kind: TransactionKind, amount: f64 },

    #[error("Agent {agent_id} is a {actual}, expected a {expected}")]
    RoleMismatch {
        agent_id: String,
        expected: AgentRole,
        actual: AgentRole,
    },

    #[error("Accounts of {agent_id} inconsistent with {tx_id}: {reason}")]
    InconsistentAccounts {
        agent_id: String,
        tx_id: TransactionId,
        reason: String,
    },

    #[error("Parameter {0} is not set")]
    MissingParameter(String),
}

/// Complete simulation state for one run
///
/// # Example
///
/// ```rust
/// use economy_simulator_core_rs::{Agent, Environment, TransactionKind};
/// use economy_simulator_core_rs::models::{BankProfile, FirmProfile};
///
/// let mut env = Environment::new();
/// env.add_agent(Agent::firm("FIRM_1", FirmProfile::default())).unwrap();
/// env.add_agent(Agent::bank("BANK_1", BankProfile::new(0.01, 0.05))).unwrap();
///
/// let id = env
///     .new_transaction(TransactionKind::Loans, "", "BANK_1", "FIRM_1", 100.0, 0.05, 0, -1)
///     .unwrap();
///
/// assert_eq!(env.agent("FIRM_1").unwrap().accounts(), &[id]);
/// assert_eq!(env.agent("BANK_1").unwrap().accounts(), &[id]);
///
/// env.remove_transaction(id).unwrap();
/// assert!(env.agent("FIRM_1").unwrap().accounts().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environment {
    agents: HashMap<String, Agent>,

    /// Role partitions, in registration order
    households: Vec<String>,
    firms: Vec<String>,
    banks: Vec<String>,

    /// Live entries keyed by id (ordered for deterministic iteration)
    transactions: BTreeMap<TransactionId, Transaction>,

    /// Scalar run-level parameters (prices, ...)
    variable_parameters: BTreeMap<String, f64>,

    next_tx_id: u64,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            next_tx_id: 1,
            ..Default::default()
        }
    }

    /// Build an environment from a population
    pub fn with_agents(agents: Vec<Agent>) -> Result<Self, LedgerError> {
        let mut env = Self::new();
        for agent in agents {
            env.add_agent(agent)?;
        }
        Ok(env)
    }

    /// Register an agent under its role
    pub fn add_agent(&mut self, agent: Agent) -> Result<(), LedgerError> {
        let id = agent.id().to_string();
        if self.agents.contains_key(&id) {
            return Err(LedgerError::DuplicateAgent(id));
        }
        match agent.role() {
            AgentRole::Household => self.households.push(id.clone()),
            AgentRole::Firm => self.firms.push(id.clone()),
            AgentRole::Bank => self.banks.push(id.clone()),
        }
        self.agents.insert(id, agent);
        Ok(())
    }

    // ========================================================================
    // Population
    // ========================================================================

    pub fn households(&self) -> &[String] {
        &self.households
    }

    pub fn firms(&self) -> &[String] {
        &self.firms
    }

    pub fn banks(&self) -> &[String] {
        &self.banks
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Agents of one role, in registration order
    pub fn agents_with_role(&self, role: AgentRole) -> impl Iterator<Item = &Agent> + '_ {
        let ids = match role {
            AgentRole::Household => &self.households,
            AgentRole::Firm => &self.firms,
            AgentRole::Bank => &self.banks,
        };
        ids.iter().filter_map(move |id| self.agents.get(id))
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    pub fn variable_parameters(&self) -> &BTreeMap<String, f64> {
        &self.variable_parameters
    }

    pub fn variable_parameters_mut(&mut self) -> &mut BTreeMap<String, f64> {
        &mut self.variable_parameters
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.variable_parameters.get(name).copied()
    }

    /// Like [`parameter`](Self::parameter), but a missing key is an error
    pub fn require_parameter(&self, name: &str) -> Result<f64, LedgerError> {
        self.parameter(name)
            .ok_or_else(|| LedgerError::MissingParameter(name.to_string()))
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) {
        self.variable_parameters.insert(name.to_string(), value);
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    /// Create an entry and register it on both endpoint agents
    ///
    /// `from` holds the asset side, `to` the liability side.
    #[allow(clippy::too_many_arguments)]
    pub fn new_transaction(
        &mut self,
        kind: TransactionKind,
        label: &str,
        from: &str,
        to: &str,
        amount: f64,
        interest_rate: f64,
        origin_time: usize,
        duration: i64,
    ) -> Result<TransactionId, LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount { kind, amount });
        }
        if from == to {
            return Err(LedgerError::SelfTransaction(from.to_string()));
        }
        for id in [from, to] {
            if !self.agents.contains_key(id) {
                return Err(LedgerError::UnknownAgent(id.to_string()));
            }
        }

        let id = TransactionId(self.next_tx_id);
        self.next_tx_id += 1;

        let tx = Transaction::new(
            id,
            kind,
            label.to_string(),
            from.to_string(),
            to.to_string(),
            amount,
            interest_rate,
            origin_time,
            duration,
        );

        // Both endpoints were checked above
        if let Some(agent) = self.agents.get_mut(from) {
            agent.attach(id);
        }
        if let Some(agent) = self.agents.get_mut(to) {
            agent.attach(id);
        }
        self.transactions.insert(id, tx);

        Ok(id)
    }

    /// Remove an entry and detach it from both endpoint agents
    ///
    /// Both endpoints are checked before anything changes, so a failure
    /// leaves the entry and every account untouched.
    pub fn remove_transaction(&mut self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let tx = self
            .transactions
            .get(&id)
            .ok_or(LedgerError::UnknownTransaction(id))?;

        for agent_id in [tx.from(), tx.to()] {
            let agent = self
                .agents
                .get(agent_id)
                .ok_or_else(|| LedgerError::UnknownAgent(agent_id.to_string()))?;
            if !agent.accounts().contains(&id) {
                return Err(LedgerError::InconsistentAccounts {
                    agent_id: agent_id.to_string(),
                    tx_id: id,
                    reason: "entry missing from accounts on removal".to_string(),
                });
            }
        }

        let tx = self
            .transactions
            .remove(&id)
            .ok_or(LedgerError::UnknownTransaction(id))?;
        for agent_id in [tx.from(), tx.to()] {
            if let Some(agent) = self.agents.get_mut(agent_id) {
                agent.detach(id);
            }
        }

        Ok(tx)
    }

    /// Remove a batch of entries collected during a scan
    pub fn remove_transactions(&mut self, ids: &[TransactionId]) -> Result<Vec<Transaction>, LedgerError> {
        ids.iter().map(|id| self.remove_transaction(*id)).collect()
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    /// All live entries, ordered by id
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.transactions.values()
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// Entries the agent participates in, in its account order
    pub fn entries_of(&self, agent_id: &str) -> Vec<&Transaction> {
        self.agents
            .get(agent_id)
            .map(|agent| {
                agent
                    .accounts()
                    .iter()
                    .filter_map(|id| self.transactions.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sum of the amounts of all entries of `kind` the agent participates in
    pub fn get_account(&self, agent_id: &str, kind: TransactionKind) -> f64 {
        self.entries_of(agent_id)
            .into_iter()
            .filter(|tx| tx.kind() == kind)
            .map(|tx| tx.amount())
            .sum()
    }

    /// Apply one step of interest to every interest-bearing entry
    ///
    /// Each entry is stored once, so it accrues once even though it sits on
    /// two agents' books. Returns the number of entries that accrued.
    pub fn accrue_interests(&mut self) -> usize {
        let mut accrued = 0;
        for tx in self.transactions.values_mut() {
            if tx.interest_rate() != 0.0 {
                tx.accrue_interest();
                accrued += 1;
            }
        }
        accrued
    }

    /// Remove every zero-value entry; returns how many were removed
    pub fn purge_accounts(&mut self) -> Result<usize, LedgerError> {
        let closed: Vec<TransactionId> = self
            .transactions
            .values()
            .filter(|tx| tx.amount() == 0.0)
            .map(|tx| tx.id())
            .collect();
        self.remove_transactions(&closed)?;
        Ok(closed.len())
    }

    // ========================================================================
    // Valuation
    // ========================================================================

    /// Money value of one unit of `kind` at current parameters
    pub fn unit_value(&self, kind: TransactionKind) -> Result<f64, LedgerError> {
        match kind {
            TransactionKind::Labour => self.require_parameter(PRICE_OF_LABOUR),
            TransactionKind::Goods => self.require_parameter(PRICE_OF_GOODS),
            _ => Ok(1.0),
        }
    }

    /// Assets minus liabilities, with real kinds valued at current prices
    pub fn net_worth(&self, agent_id: &str) -> Result<f64, LedgerError> {
        if !self.agents.contains_key(agent_id) {
            return Err(LedgerError::UnknownAgent(agent_id.to_string()));
        }
        let mut total = 0.0;
        for tx in self.entries_of(agent_id) {
            total += tx.signed_amount_for(agent_id) * self.unit_value(tx.kind())?;
        }
        Ok(total)
    }

    /// Sum of every agent's net worth (zero up to rounding in a consistent ledger)
    pub fn total_net_worth(&self) -> Result<f64, LedgerError> {
        let mut total = 0.0;
        for id in self.households.iter().chain(&self.firms).chain(&self.banks) {
            total += self.net_worth(id)?;
        }
        Ok(total)
    }

    /// Verify the two-sided reference invariant
    pub fn check_consistency(&self) -> Result<(), LedgerError> {
        for tx in self.transactions.values() {
            for agent_id in [tx.from(), tx.to()] {
                let agent = self
                    .agents
                    .get(agent_id)
                    .ok_or_else(|| LedgerError::UnknownAgent(agent_id.to_string()))?;
                let count = agent.accounts().iter().filter(|id| **id == tx.id()).count();
                if count != 1 {
                    return Err(LedgerError::InconsistentAccounts {
                        agent_id: agent_id.to_string(),
                        tx_id: tx.id(),
                        reason: format!("referenced {} times", count),
                    });
                }
            }
        }

        for agent in self.agents.values() {
            for id in agent.accounts() {
                let tx = self.transactions.get(id).ok_or_else(|| LedgerError::InconsistentAccounts {
                    agent_id: agent.id().to_string(),
                    tx_id: *id,
                    reason: "dangling reference".to_string(),
                })?;
                if !tx.involves(agent.id()) {
                    return Err(LedgerError::InconsistentAccounts {
                        agent_id: agent.id().to_string(),
                        tx_id: *id,
                        reason: "agent is not an endpoint".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
