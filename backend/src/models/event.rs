//! Event logging for step replay and auditing.
//!
//! Every pipeline stage records what it did as an [`Event`]. The log mirrors
//! the `tracing` output but stays queryable from tests and the driver:
//! - **InterestAccrued** / **LabourEndowed**: bookkeeping stages
//! - **PriceSet**: a market price was recorded in the environment
//! - **Trade**: a rationed match was settled through a bank
//! - **Netted**: a bilateral position was consolidated
//! - **Purged**: zero-value entries were removed
//! - **StageCompleted**: a stage finished for a step
//!
//! # Example
//!
//! ```rust
//! use economy_simulator_core_rs::models::event::{Event, EventLog, MarketKind};
//!
//! let mut log = EventLog::new();
//! log.log(Event::PriceSet { step: 3, market: MarketKind::Labour, price: 16.8 });
//! assert_eq!(log.events_at_step(3).len(), 1);
//! ```

use crate::models::transaction::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which market an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Labour,
    Goods,
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Labour => f.write_str("labour"),
            MarketKind::Goods => f.write_str("goods"),
        }
    }
}

/// The fixed stages of one update step, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AccrueInterests,
    EndowLabour,
    SellLabour,
    ConsumeRationed,
    NetLoansDeposits,
    NetLabourGoods,
    Purge,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::AccrueInterests,
        Stage::EndowLabour,
        Stage::SellLabour,
        Stage::ConsumeRationed,
        Stage::NetLoansDeposits,
        Stage::NetLabourGoods,
        Stage::Purge,
    ];

    /// Human-readable description used in log lines
    pub fn description(&self) -> &'static str {
        match self {
            Stage::AccrueInterests => "interest accrued",
            Stage::EndowLabour => "labour endowed",
            Stage::SellLabour => "labour sold to firms",
            Stage::ConsumeRationed => "goods consumed",
            Stage::NetLoansDeposits => "deposits and loans netted",
            Stage::NetLabourGoods => "labour and goods netted",
            Stage::Purge => "accounts purged",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Simulation event capturing a state change.
///
/// All events carry the step index they happened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    InterestAccrued {
        step: usize,
        entries: usize,
    },

    LabourEndowed {
        step: usize,
        households: usize,
    },

    PriceSet {
        step: usize,
        market: MarketKind,
        price: f64,
    },

    /// A match settled through a bank (factor entry + deposit + loan)
    Trade {
        step: usize,
        market: MarketKind,
        seller_id: String,
        buyer_id: String,
        bank_id: String,
        quantity: f64,
        price: f64,
    },

    /// A bilateral position was consolidated
    Netted {
        step: usize,
        agent_id: String,
        counterpart_id: String,
        balance: f64,
        removed: usize,
        replacement: Option<TransactionId>,
    },

    Purged {
        step: usize,
        removed: usize,
    },

    StageCompleted {
        step: usize,
        stage: Stage,
    },
}

impl Event {
    pub fn step(&self) -> usize {
        match self {
            Event::InterestAccrued { step, .. } => *step,
            Event::LabourEndowed { step, .. } => *step,
            Event::PriceSet { step, .. } => *step,
            Event::Trade { step, .. } => *step,
            Event::Netted { step, .. } => *step,
            Event::Purged { step, .. } => *step,
            Event::StageCompleted { step, .. } => *step,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::InterestAccrued { .. } => "InterestAccrued",
            Event::LabourEndowed { .. } => "LabourEndowed",
            Event::PriceSet { .. } => "PriceSet",
            Event::Trade { .. } => "Trade",
            Event::Netted { .. } => "Netted",
            Event::Purged { .. } => "Purged",
            Event::StageCompleted { .. } => "StageCompleted",
        }
    }

    /// Whether the event names the agent on either side
    pub fn involves(&self, agent_id: &str) -> bool {
        match self {
            Event::Trade {
                seller_id,
                buyer_id,
                bank_id,
                ..
            } => seller_id == agent_id || buyer_id == agent_id || bank_id == agent_id,
            Event::Netted {
                agent_id: a,
                counterpart_id: b,
                ..
            } => a == agent_id || b == agent_id,
            _ => false,
        }
    }
}

/// Event log for storing and querying simulation events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_step(&self, step: usize) -> Vec<&Event> {
        self.events.iter().filter(|e| e.step() == step).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_agent(&self, agent_id: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.involves(agent_id)).collect()
    }

    /// Trades of one market, in settlement order
    pub fn trades(&self, market: MarketKind) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Trade { market: m, .. } if *m == market))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
