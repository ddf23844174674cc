//! Agent model
//!
//! Agents come in three roles:
//! - **Household**: sells labour, buys goods, saves a fraction of its deposits
//! - **Firm**: buys labour, produces goods with a Cobb-Douglas technology
//! - **Bank**: intermediates every trade through deposits and loans
//!
//! The update pipeline never branches on the role itself. It asks an agent for
//! the capability a stage needs ([`SuppliesLabour`], [`DemandsLabour`],
//! [`ProducesGoods`], [`Intermediates`]) and skips agents that lack it.
//!
//! Each agent keeps an ordered list of the ledger entries it participates in.
//! The entries themselves live in the [`Environment`](crate::Environment);
//! only the environment attaches and detaches references.

use crate::models::transaction::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Capabilities
// ============================================================================

/// Labour supply schedule
pub trait SuppliesLabour {
    /// Hours offered at the given wage
    fn supply_of_labour(&self, price: f64) -> f64;
}

/// Labour demand schedule
pub trait DemandsLabour {
    /// Hours wanted at the given wage, given the price the output will sell at
    fn demand_for_labour(&self, price: f64, price_of_goods: f64) -> f64;
}

/// Production technology
pub trait ProducesGoods {
    /// Units produced from the given labour input
    fn output(&self, labour: f64) -> f64;
}

/// Deposit and loan terms of an intermediating bank
pub trait Intermediates {
    fn interest_rate_deposits(&self) -> f64;
    fn interest_rate_loans(&self) -> f64;
}

/// Cobb-Douglas production: `tfp * labour^alpha * capital^beta`
pub fn cobb_douglas(labour: f64, capital: f64, total_factor_productivity: f64, alpha: f64, beta: f64) -> f64 {
    total_factor_productivity * labour.powf(alpha) * capital.powf(beta)
}

// ============================================================================
// Role profiles
// ============================================================================

/// Household parameters and per-step state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdProfile {
    /// Labour endowment per step (fixed for the run)
    pub labour: f64,

    /// Share of deposits kept as savings when buying goods, in [0, 1]
    pub propensity_to_save: f64,

    /// Labour left to sell in the current step
    #[serde(default)]
    pub sweep_labour: f64,
}

impl HouseholdProfile {
    pub fn new(labour: f64, propensity_to_save: f64) -> Self {
        Self {
            labour,
            propensity_to_save,
            sweep_labour: 0.0,
        }
    }
}

impl SuppliesLabour for HouseholdProfile {
    /// Inelastic: everything left in the sweep is offered at any positive wage
    fn supply_of_labour(&self, price: f64) -> f64 {
        if price > 0.0 {
            self.sweep_labour
        } else {
            0.0
        }
    }
}

fn default_total_factor_productivity() -> f64 {
    15.0
}

fn default_labour_elasticity() -> f64 {
    0.5
}

fn default_capital() -> f64 {
    1.0
}

/// Firm technology
///
/// Labour demand is the profit-maximising input for the Cobb-Douglas
/// technology: `L* = (alpha * A * K^beta * P / w)^(1 / (1 - alpha))`,
/// optionally capped by `labour_capacity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmProfile {
    #[serde(default = "default_total_factor_productivity")]
    pub total_factor_productivity: f64,

    #[serde(default = "default_labour_elasticity")]
    pub labour_elasticity: f64,

    #[serde(default = "default_capital")]
    pub capital: f64,

    #[serde(default)]
    pub capital_elasticity: f64,

    /// Upper bound on hours hired per step (None = unconstrained)
    #[serde(default)]
    pub labour_capacity: Option<f64>,
}

impl Default for FirmProfile {
    fn default() -> Self {
        Self {
            total_factor_productivity: default_total_factor_productivity(),
            labour_elasticity: default_labour_elasticity(),
            capital: default_capital(),
            capital_elasticity: 0.0,
            labour_capacity: None,
        }
    }
}

impl FirmProfile {
    pub fn with_labour_capacity(mut self, capacity: f64) -> Self {
        self.labour_capacity = Some(capacity);
        self
    }
}

impl DemandsLabour for FirmProfile {
    fn demand_for_labour(&self, price: f64, price_of_goods: f64) -> f64 {
        let unconstrained = if self.labour_elasticity >= 1.0 || price <= 0.0 {
            f64::INFINITY
        } else {
            let marginal_revenue = self.labour_elasticity
                * self.total_factor_productivity
                * self.capital.powf(self.capital_elasticity)
                * price_of_goods;
            (marginal_revenue / price).powf(1.0 / (1.0 - self.labour_elasticity))
        };

        match self.labour_capacity {
            Some(capacity) => unconstrained.min(capacity),
            None => unconstrained,
        }
    }
}

impl ProducesGoods for FirmProfile {
    fn output(&self, labour: f64) -> f64 {
        cobb_douglas(
            labour,
            self.capital,
            self.total_factor_productivity,
            self.labour_elasticity,
            self.capital_elasticity,
        )
    }
}

/// Bank terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankProfile {
    pub interest_rate_deposits: f64,
    pub interest_rate_loans: f64,
}

impl BankProfile {
    pub fn new(interest_rate_deposits: f64, interest_rate_loans: f64) -> Self {
        Self {
            interest_rate_deposits,
            interest_rate_loans,
        }
    }
}

impl Intermediates for BankProfile {
    fn interest_rate_deposits(&self) -> f64 {
        self.interest_rate_deposits
    }

    fn interest_rate_loans(&self) -> f64 {
        self.interest_rate_loans
    }
}

// ============================================================================
// Agent
// ============================================================================

/// Role tag of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Household,
    Firm,
    Bank,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Household => f.write_str("household"),
            AgentRole::Firm => f.write_str("firm"),
            AgentRole::Bank => f.write_str("bank"),
        }
    }
}

/// Role-specific behaviour of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Behaviour {
    Household(HouseholdProfile),
    Firm(FirmProfile),
    Bank(BankProfile),
}

/// A participant in the economy
///
/// # Example
/// ```
/// use economy_simulator_core_rs::Agent;
/// use economy_simulator_core_rs::models::{AgentRole, HouseholdProfile, SuppliesLabour};
///
/// let mut agent = Agent::household("HH_1", HouseholdProfile::new(10.0, 0.3));
/// assert_eq!(agent.role(), AgentRole::Household);
///
/// agent.as_household_mut().unwrap().sweep_labour = 10.0;
/// assert_eq!(agent.as_household().unwrap().supply_of_labour(2.0), 10.0);
/// assert!(agent.as_firm().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    id: String,

    behaviour: Behaviour,

    /// Ledger entries this agent participates in, in creation order
    accounts: Vec<TransactionId>,
}

impl Agent {
    pub fn new(id: impl Into<String>, behaviour: Behaviour) -> Self {
        Self {
            id: id.into(),
            behaviour,
            accounts: Vec::new(),
        }
    }

    pub fn household(id: impl Into<String>, profile: HouseholdProfile) -> Self {
        Self::new(id, Behaviour::Household(profile))
    }

    pub fn firm(id: impl Into<String>, profile: FirmProfile) -> Self {
        Self::new(id, Behaviour::Firm(profile))
    }

    pub fn bank(id: impl Into<String>, profile: BankProfile) -> Self {
        Self::new(id, Behaviour::Bank(profile))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> AgentRole {
        match self.behaviour {
            Behaviour::Household(_) => AgentRole::Household,
            Behaviour::Firm(_) => AgentRole::Firm,
            Behaviour::Bank(_) => AgentRole::Bank,
        }
    }

    pub fn behaviour(&self) -> &Behaviour {
        &self.behaviour
    }

    /// Ledger entry references, in creation order
    pub fn accounts(&self) -> &[TransactionId] {
        &self.accounts
    }

    pub fn as_household(&self) -> Option<&HouseholdProfile> {
        match &self.behaviour {
            Behaviour::Household(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_household_mut(&mut self) -> Option<&mut HouseholdProfile> {
        match &mut self.behaviour {
            Behaviour::Household(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_firm(&self) -> Option<&FirmProfile> {
        match &self.behaviour {
            Behaviour::Firm(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_bank(&self) -> Option<&BankProfile> {
        match &self.behaviour {
            Behaviour::Bank(profile) => Some(profile),
            _ => None,
        }
    }

    pub(crate) fn attach(&mut self, tx_id: TransactionId) {
        self.accounts.push(tx_id);
    }

    /// Drop the reference to `tx_id`; returns false if it was not held
    pub(crate) fn detach(&mut self, tx_id: TransactionId) -> bool {
        match self.accounts.iter().position(|id| *id == tx_id) {
            Some(index) => {
                self.accounts.remove(index);
                true
            }
            None => false,
        }
    }
}
