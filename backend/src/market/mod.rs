//! Market Clearing Module
//!
//! Two services used by the update pipeline:
//! - **Tatonnement**: iterative search for the price at which aggregate
//!   supply meets aggregate demand within a tolerance
//! - **Rationing**: turns individual signed positions (positive = supply,
//!   negative = demand) into bilateral matches
//!
//! The pipeline talks to these through the [`MarketClearing`] trait so tests
//! can inject a stub that fixes prices or records what it was asked.
//!
//! # Example
//!
//! ```rust
//! use economy_simulator_core_rs::market::{Market, MarketClearing, Participant, Position, SearchParams};
//!
//! let market = Market::new();
//!
//! // Inelastic supply of 20 hours, demand of 100/p hours
//! let sellers = vec![Participant::new("HH_1", |_p: f64| 20.0)];
//! let buyers = vec![Participant::new("FIRM_1", |p: f64| 100.0 / p)];
//!
//! let params = SearchParams::default();
//! let price = market.find_equilibrium_price(&sellers, &buyers, &params).unwrap();
//! assert!((20.0 - 100.0 / price).abs() <= params.tolerance);
//!
//! let matches = market.ration(&[Position::new("HH_1", 20.0), Position::new("FIRM_1", -20.0)]);
//! assert_eq!(matches.len(), 1);
//! assert_eq!(matches[0].quantity, 20.0);
//! ```

pub mod rationing;
pub mod tatonnement;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rationing::{ration, ration_abstract};
pub use tatonnement::find_equilibrium_price;

/// Errors raised by the clearing algorithms
#[derive(Debug, Error, PartialEq)]
pub enum MarketError {
    #[error("Invalid search parameters: {0}")]
    InvalidParameters(String),

    #[error("Excess supply is not finite at price {price}")]
    NonFiniteExcess { price: f64 },

    #[error("No equilibrium after {iterations} iterations (last price {price}, excess supply {excess})")]
    NoConvergence {
        iterations: usize,
        price: f64,
        excess: f64,
    },
}

fn default_tolerance() -> f64 {
    0.001
}

fn default_resolution() -> f64 {
    0.01
}

fn default_amplification() -> f64 {
    1.1
}

fn default_max_iterations() -> usize {
    10_000
}

/// Settings of the equilibrium price search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Price to start from; non-positive means "no preference"
    #[serde(default)]
    pub start_price: f64,

    /// Accepted |supply - demand| at the returned price
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Initial step of the expanding search
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Step multiplier while the excess keeps its sign
    #[serde(default = "default_amplification")]
    pub amplification: f64,

    /// Hard bound on evaluations of the excess function
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            start_price: 0.0,
            tolerance: default_tolerance(),
            resolution: default_resolution(),
            amplification: default_amplification(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), MarketError> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(MarketError::InvalidParameters(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.resolution > 0.0 && self.resolution.is_finite()) {
            return Err(MarketError::InvalidParameters(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.amplification >= 1.0 && self.amplification.is_finite()) {
            return Err(MarketError::InvalidParameters(format!(
                "amplification must be >= 1, got {}",
                self.amplification
            )));
        }
        if self.max_iterations == 0 {
            return Err(MarketError::InvalidParameters(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if !self.start_price.is_finite() {
            return Err(MarketError::InvalidParameters(format!(
                "start_price must be finite, got {}",
                self.start_price
            )));
        }
        Ok(())
    }
}

/// An agent together with its quantity schedule (price -> quantity)
pub struct Participant<'a> {
    pub agent_id: &'a str,
    schedule: Box<dyn Fn(f64) -> f64 + 'a>,
}

impl<'a> Participant<'a> {
    pub fn new(agent_id: &'a str, schedule: impl Fn(f64) -> f64 + 'a) -> Self {
        Self {
            agent_id,
            schedule: Box::new(schedule),
        }
    }

    pub fn quantity_at(&self, price: f64) -> f64 {
        (self.schedule)(price)
    }
}

impl std::fmt::Debug for Participant<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

/// Signed quantity of one agent: positive = supply, negative = demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub agent_id: String,
    pub quantity: f64,
}

impl Position {
    pub fn new(agent_id: impl Into<String>, quantity: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            quantity,
        }
    }
}

/// One bilateral trade produced by rationing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub supplier: String,
    pub demander: String,
    pub quantity: f64,
}

/// Market clearing contract consumed by the update pipeline
pub trait MarketClearing {
    /// Price at which aggregate supply and demand agree within tolerance
    fn find_equilibrium_price(
        &self,
        sellers: &[Participant<'_>],
        buyers: &[Participant<'_>],
        params: &SearchParams,
    ) -> Result<f64, MarketError>;

    /// Greedy matching of suppliers and demanders in input order
    fn ration(&self, positions: &[Position]) -> Vec<Match>;

    /// Matching restricted by `allow` and scaled by `weight`
    fn ration_abstract(
        &self,
        positions: &[Position],
        weight: &dyn Fn(&str, &str) -> f64,
        allow: &dyn Fn(&str, &str) -> bool,
    ) -> Vec<Match>;
}

/// Default clearing service (stateless)
#[derive(Debug, Clone, Copy, Default)]
pub struct Market;

impl Market {
    pub fn new() -> Self {
        Market
    }
}

impl MarketClearing for Market {
    fn find_equilibrium_price(
        &self,
        sellers: &[Participant<'_>],
        buyers: &[Participant<'_>],
        params: &SearchParams,
    ) -> Result<f64, MarketError> {
        tatonnement::find_equilibrium_price(sellers, buyers, params)
    }

    fn ration(&self, positions: &[Position]) -> Vec<Match> {
        rationing::ration(positions)
    }

    fn ration_abstract(
        &self,
        positions: &[Position],
        weight: &dyn Fn(&str, &str) -> f64,
        allow: &dyn Fn(&str, &str) -> bool,
    ) -> Vec<Match> {
        rationing::ration_abstract(positions, weight, allow)
    }
}
