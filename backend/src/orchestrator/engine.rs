//! Orchestrator Engine
//!
//! Owns one simulation run: the [`Environment`] built from configuration,
//! the [`Updater`] pipeline and the step counter.
//!
//! # Architecture
//!
//! ```text
//! SimulationConfig ──validate──> Environment (households, firms, banks)
//!                               Updater (UpdaterConfig, Market, RngManager)
//!
//! For each step t:
//!   report = updater.do_update(environment, t)
//!   t += 1
//! ```
//!
//! # Example
//!
//! ```rust
//! use economy_simulator_core_rs::orchestrator::{
//!     BankConfig, FirmConfig, HouseholdConfig, Orchestrator, SimulationConfig,
//! };
//!
//! let config = SimulationConfig {
//!     rng_seed: 12345,
//!     num_steps: 3,
//!     households: vec![HouseholdConfig::new("HH_1", 10.0, 0.5)],
//!     firms: vec![FirmConfig::new("FIRM_1")],
//!     banks: vec![BankConfig::new("BANK_1", 0.01, 0.02)],
//!     updater: Default::default(),
//! };
//!
//! let mut orchestrator = Orchestrator::new(config).unwrap();
//! let reports = orchestrator.run_to_end().unwrap();
//! assert_eq!(reports.len(), 3);
//! assert_eq!(orchestrator.current_step(), 3);
//! ```

use crate::market::{MarketClearing, MarketError};
use crate::models::agent::{Agent, BankProfile, FirmProfile, HouseholdProfile};
use crate::models::environment::{Environment, LedgerError};
use crate::models::event::{EventLog, MarketKind};
use crate::orchestrator::checkpoint::{compute_config_hash, compute_ledger_digest};
use crate::orchestrator::updater::{StepReport, Updater, UpdaterConfig};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

fn default_num_steps() -> usize {
    10
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// RNG seed for deterministic bank selection
    #[serde(default)]
    pub rng_seed: u64,

    /// Steps executed by [`Orchestrator::run_to_end`]
    #[serde(default = "default_num_steps")]
    pub num_steps: usize,

    pub households: Vec<HouseholdConfig>,

    pub firms: Vec<FirmConfig>,

    pub banks: Vec<BankConfig>,

    #[serde(default)]
    pub updater: UpdaterConfig,
}

/// Household configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdConfig {
    pub id: String,

    /// Labour endowment per step
    pub labour: f64,

    #[serde(default)]
    pub propensity_to_save: f64,
}

impl HouseholdConfig {
    pub fn new(id: impl Into<String>, labour: f64, propensity_to_save: f64) -> Self {
        Self {
            id: id.into(),
            labour,
            propensity_to_save,
        }
    }
}

/// Firm configuration (technology fields inline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmConfig {
    pub id: String,

    #[serde(flatten)]
    pub profile: FirmProfile,
}

impl FirmConfig {
    /// Firm with the default technology
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profile: FirmProfile::default(),
        }
    }

    pub fn with_profile(id: impl Into<String>, profile: FirmProfile) -> Self {
        Self {
            id: id.into(),
            profile,
        }
    }
}

/// Bank configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    pub id: String,

    #[serde(default)]
    pub interest_rate_deposits: f64,

    #[serde(default)]
    pub interest_rate_loans: f64,
}

impl BankConfig {
    pub fn new(id: impl Into<String>, interest_rate_deposits: f64, interest_rate_loans: f64) -> Self {
        Self {
            id: id.into(),
            interest_rate_deposits,
            interest_rate_loans,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Simulation error types
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("No bank available to settle {market} trades at step {time}")]
    NoBanks { market: MarketKind, time: usize },

    #[error("Invalid {market} price: {price}")]
    InvalidPrice { market: MarketKind, price: f64 },

    #[error("Parameter {0} must be set before netting")]
    MissingParameter(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Run aborted: step {step} failed part-way and cannot be resumed")]
    RunAborted { step: usize },
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Main orchestrator managing simulation state and the step loop
///
/// # Determinism
///
/// All randomness is via the updater's seeded xorshift64* generator.
/// Same seed + same config = identical ledger at every step.
#[derive(Debug)]
pub struct Orchestrator {
    environment: Environment,

    updater: Updater,

    /// Next step to execute
    current_step: usize,

    num_steps: usize,

    /// SHA256 of the configuration this run was built from
    config_hash: String,

    /// Step that failed, if any; the ledger may hold a partial step
    failed_step: Option<usize>,
}

impl Orchestrator {
    /// Create new orchestrator from configuration
    ///
    /// Validates the configuration and builds the population.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let rng = RngManager::new(config.rng_seed);
        let updater = Updater::new(config.updater.clone(), rng);
        Self::build(config, updater)
    }

    /// Same as [`new`](Self::new) with a caller-provided clearing service
    pub fn with_market(config: SimulationConfig, market: Box<dyn MarketClearing>) -> Result<Self, SimulationError> {
        let rng = RngManager::new(config.rng_seed);
        let updater = Updater::with_market(config.updater.clone(), rng, market);
        Self::build(config, updater)
    }

    fn build(config: SimulationConfig, updater: Updater) -> Result<Self, SimulationError> {
        Self::validate_config(&config)?;
        let config_hash = compute_config_hash(&config)?;

        let mut agents = Vec::with_capacity(config.households.len() + config.firms.len() + config.banks.len());
        for hc in &config.households {
            agents.push(Agent::household(
                hc.id.clone(),
                HouseholdProfile::new(hc.labour, hc.propensity_to_save),
            ));
        }
        for fc in &config.firms {
            agents.push(Agent::firm(fc.id.clone(), fc.profile.clone()));
        }
        for bc in &config.banks {
            agents.push(Agent::bank(
                bc.id.clone(),
                BankProfile::new(bc.interest_rate_deposits, bc.interest_rate_loans),
            ));
        }
        let environment = Environment::with_agents(agents)?;

        tracing::info!(
            households = config.households.len(),
            firms = config.firms.len(),
            banks = config.banks.len(),
            seed = config.rng_seed,
            config_hash = %config_hash,
            "simulation initialised"
        );

        Ok(Self {
            environment,
            updater,
            current_step: 0,
            num_steps: config.num_steps,
            config_hash,
            failed_step: None,
        })
    }

    /// Validate configuration
    fn validate_config(config: &SimulationConfig) -> Result<(), SimulationError> {
        if config.households.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "Must have at least one household".to_string(),
            ));
        }
        if config.firms.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "Must have at least one firm".to_string(),
            ));
        }
        if config.banks.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "Must have at least one bank".to_string(),
            ));
        }

        // Check for duplicate agent IDs across all roles
        let mut ids = HashSet::new();
        let all_ids = config
            .households
            .iter()
            .map(|h| &h.id)
            .chain(config.firms.iter().map(|f| &f.id))
            .chain(config.banks.iter().map(|b| &b.id));
        for id in all_ids {
            if !ids.insert(id) {
                return Err(SimulationError::InvalidConfig(format!("Duplicate agent ID: {}", id)));
            }
        }

        for hc in &config.households {
            if !(hc.labour.is_finite() && hc.labour >= 0.0) {
                return Err(SimulationError::InvalidConfig(format!(
                    "Household {} labour must be non-negative, got {}",
                    hc.id, hc.labour
                )));
            }
            if !(0.0..=1.0).contains(&hc.propensity_to_save) {
                return Err(SimulationError::InvalidConfig(format!(
                    "Household {} propensity_to_save must be in [0, 1], got {}",
                    hc.id, hc.propensity_to_save
                )));
            }
        }

        for fc in &config.firms {
            let p = &fc.profile;
            let technology = [p.total_factor_productivity, p.labour_elasticity, p.capital, p.capital_elasticity];
            if technology.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
                return Err(SimulationError::InvalidConfig(format!(
                    "Firm {} technology parameters must be finite and non-negative",
                    fc.id
                )));
            }
            if p.labour_elasticity >= 1.0 && p.labour_capacity.is_none() {
                return Err(SimulationError::InvalidConfig(format!(
                    "Firm {} labour_elasticity must be below 1 without a labour_capacity, got {}",
                    fc.id, p.labour_elasticity
                )));
            }
            if let Some(capacity) = p.labour_capacity {
                if !(capacity >= 0.0) {
                    return Err(SimulationError::InvalidConfig(format!(
                        "Firm {} labour_capacity must be non-negative, got {}",
                        fc.id, capacity
                    )));
                }
            }
        }

        for bc in &config.banks {
            for rate in [bc.interest_rate_deposits, bc.interest_rate_loans] {
                if !(rate.is_finite() && rate > -1.0) {
                    return Err(SimulationError::InvalidConfig(format!(
                        "Bank {} interest rates must be finite and above -1, got {}",
                        bc.id, rate
                    )));
                }
            }
        }

        let goods_price = config.updater.goods_price;
        if !(goods_price.is_finite() && goods_price > 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "goods_price must be positive, got {}",
                goods_price
            )));
        }
        config
            .updater
            .labour_search
            .validate()
            .map_err(|e| SimulationError::InvalidConfig(e.to_string()))?;

        Ok(())
    }

    /// Build from a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        let config: SimulationConfig = serde_json::from_str(json)
            .map_err(|e| SimulationError::SerializationError(format!("Config parse failed: {}", e)))?;
        Self::new(config)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Index of the next step to run
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Configured run length
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Get mutable reference to the environment
    ///
    /// Primarily for tests that seed the ledger before stepping. Direct
    /// mutation bypasses the pipeline's conservation guarantees.
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    pub fn event_log(&self) -> &EventLog {
        self.updater.event_log()
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// SHA256 digest of the current ledger
    pub fn ledger_digest(&self) -> Result<String, SimulationError> {
        compute_ledger_digest(&self.environment, self.current_step)
    }

    // ========================================================================
    // Step Loop
    // ========================================================================

    /// Execute one simulation step
    ///
    /// On error the step counter does not advance and the run is aborted:
    /// every later call returns [`SimulationError::RunAborted`].
    pub fn tick(&mut self) -> Result<StepReport, SimulationError> {
        if let Some(step) = self.failed_step {
            return Err(SimulationError::RunAborted { step });
        }
        match self.updater.do_update(&mut self.environment, self.current_step) {
            Ok(report) => {
                self.current_step += 1;
                Ok(report)
            }
            Err(e) => {
                tracing::error!(step = self.current_step, error = %e, "step failed, aborting run");
                self.failed_step = Some(self.current_step);
                Err(e)
            }
        }
    }

    /// Whether a failed step has aborted the run
    pub fn is_aborted(&self) -> bool {
        self.failed_step.is_some()
    }

    /// Execute `steps` steps, stopping at the first error
    pub fn run(&mut self, steps: usize) -> Result<Vec<StepReport>, SimulationError> {
        (0..steps).map(|_| self.tick()).collect()
    }

    /// Execute the remaining configured steps
    pub fn run_to_end(&mut self) -> Result<Vec<StepReport>, SimulationError> {
        let remaining = self.num_steps.saturating_sub(self.current_step);
        self.run(remaining)
    }
}
