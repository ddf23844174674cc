//! Triangular settlement of a market trade through a bank
//!
//! Every matched trade is booked as three entries so that no agent's net
//! worth changes at the traded price:
//!
//! ```text
//! factor    buyer  -> seller   quantity           rate 0
//! deposits  seller -> bank     quantity * price   bank deposit rate
//! loans     bank   -> buyer    quantity * price   bank loan rate
//! ```
//!
//! (`from -> to`, with `from` holding the asset.)

use crate::models::agent::{AgentRole, Intermediates};
use crate::models::environment::{Environment, LedgerError};
use crate::models::transaction::{TransactionId, TransactionKind, OPEN_ENDED};

/// Identifiers of the three entries created for one trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triad {
    pub factor: TransactionId,
    pub deposit: TransactionId,
    pub loan: TransactionId,
}

/// Book a trade of `quantity` units of `kind` at `price` through `bank_id`
///
/// All arguments are validated before the first entry is created, so the
/// ledger is untouched on error.
///
/// # Example
/// ```
/// use economy_simulator_core_rs::{Agent, Environment, TransactionKind};
/// use economy_simulator_core_rs::models::{BankProfile, FirmProfile, HouseholdProfile};
/// use economy_simulator_core_rs::settlement::settle_through_bank;
///
/// let mut env = Environment::with_agents(vec![
///     Agent::household("HH_1", HouseholdProfile::new(10.0, 0.5)),
///     Agent::firm("FIRM_1", FirmProfile::default()),
///     Agent::bank("BANK_1", BankProfile::new(0.01, 0.05)),
/// ])
/// .unwrap();
///
/// let triad = settle_through_bank(
///     &mut env, TransactionKind::Labour, "HH_1", "FIRM_1", "BANK_1", 10.0, 2.5, 0,
/// )
/// .unwrap();
///
/// assert_eq!(env.transaction(triad.factor).unwrap().amount(), 10.0);
/// assert_eq!(env.transaction(triad.deposit).unwrap().amount(), 25.0);
/// assert_eq!(env.transaction(triad.loan).unwrap().interest_rate(), 0.05);
/// ```
#[allow(clippy::too_many_arguments)]
pub fn settle_through_bank(
    env: &mut Environment,
    kind: TransactionKind,
    seller_id: &str,
    buyer_id: &str,
    bank_id: &str,
    quantity: f64,
    price: f64,
    time: usize,
) -> Result<Triad, LedgerError> {
    let bank = env
        .agent(bank_id)
        .ok_or_else(|| LedgerError::UnknownAgent(bank_id.to_string()))?;
    let terms = bank.as_bank().ok_or_else(|| LedgerError::RoleMismatch {
        agent_id: bank_id.to_string(),
        expected: AgentRole::Bank,
        actual: bank.role(),
    })?;
    let (deposit_rate, loan_rate) = (terms.interest_rate_deposits(), terms.interest_rate_loans());

    for id in [seller_id, buyer_id] {
        if env.agent(id).is_none() {
            return Err(LedgerError::UnknownAgent(id.to_string()));
        }
        if id == bank_id {
            return Err(LedgerError::SelfTransaction(id.to_string()));
        }
    }
    if seller_id == buyer_id {
        return Err(LedgerError::SelfTransaction(seller_id.to_string()));
    }

    if !quantity.is_finite() || quantity < 0.0 {
        return Err(LedgerError::InvalidAmount {
            kind,
            amount: quantity,
        });
    }
    let value = quantity * price;
    if !value.is_finite() || value < 0.0 {
        return Err(LedgerError::InvalidAmount {
            kind: TransactionKind::Deposits,
            amount: value,
        });
    }

    let factor = env.new_transaction(kind, "", buyer_id, seller_id, quantity, 0.0, time, OPEN_ENDED)?;
    let deposit = env.new_transaction(
        TransactionKind::Deposits,
        "",
        seller_id,
        bank_id,
        value,
        deposit_rate,
        time,
        OPEN_ENDED,
    )?;
    let loan = env.new_transaction(
        TransactionKind::Loans,
        "",
        bank_id,
        buyer_id,
        value,
        loan_rate,
        time,
        OPEN_ENDED,
    )?;

    Ok(Triad {
        factor,
        deposit,
        loan,
    })
}
