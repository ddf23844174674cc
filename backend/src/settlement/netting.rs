//! Bilateral netting
//!
//! Collapses every entry of a given set of kinds between an agent and one
//! counterpart into at most one replacement entry.
//!
//! # Algorithm
//!
//! 1. Scan the agent's accounts in order. An entry is relevant when its kind
//!    and the side the counterpart occupies match a [`NettingTerm`].
//! 2. Sum the signed values from the agent's perspective: `+amount * unit`
//!    when the agent holds the asset, `-amount * unit` when it carries the
//!    liability.
//! 3. Remove every relevant entry.
//! 4. Create one replacement: the surplus kind (agent holds the asset) when
//!    the balance is strictly positive, the deficit kind (counterpart holds
//!    the asset) when strictly negative, nothing when exactly zero.
//!
//! If the scan finds a single entry that already is the replacement the
//! rule would create, the ledger is left untouched. Netting twice in a row
//! is therefore a no-op the second time.
//!
//! # Critical Invariants
//!
//! 1. **Exactness**: the replacement's signed value equals the scanned sum
//! 2. **Net worth conservation**: neither party's net worth changes

use crate::models::environment::{Environment, LedgerError};
use crate::models::transaction::{Transaction, TransactionId, TransactionKind, OPEN_ENDED};

/// Endpoint occupied by the counterpart in a scanned entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Counterpart holds the asset; counts negative for the agent
    From,
    /// Counterpart carries the liability; counts positive for the agent
    To,
}

/// One kind of entry taken into the balance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NettingTerm {
    pub kind: TransactionKind,
    pub counterpart_side: Side,
    /// Money value of one unit of amount
    pub unit_value: f64,
}

impl NettingTerm {
    pub fn new(kind: TransactionKind, counterpart_side: Side, unit_value: f64) -> Self {
        Self {
            kind,
            counterpart_side,
            unit_value,
        }
    }

    fn matches(&self, tx: &Transaction, agent_id: &str, counterpart_id: &str) -> bool {
        if tx.kind() != self.kind {
            return false;
        }
        match self.counterpart_side {
            Side::From => tx.from() == counterpart_id && tx.to() == agent_id,
            Side::To => tx.to() == counterpart_id && tx.from() == agent_id,
        }
    }
}

/// Entry created for a non-zero balance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Replacement {
    pub kind: TransactionKind,
    pub interest_rate: f64,
}

/// Which entries to net and what to replace them with
#[derive(Debug, Clone, PartialEq)]
pub struct NettingRule {
    pub terms: Vec<NettingTerm>,
    /// Used when the agent ends up holding the asset
    pub surplus: Replacement,
    /// Used when the counterpart ends up holding the asset
    pub deficit: Replacement,
}

/// Result of netting one pair
#[derive(Debug, Clone, PartialEq)]
pub struct NetOutcome {
    /// Signed balance from the agent's perspective
    pub balance: f64,
    /// Entries removed from the ledger
    pub removed: Vec<Transaction>,
    /// Entry created for the balance, if any
    pub replacement: Option<TransactionId>,
    /// The pair was already in canonical form and nothing changed
    pub unchanged: bool,
}

impl NetOutcome {
    pub fn entries_removed(&self) -> usize {
        self.removed.len()
    }
}

/// Net all `rule` entries between `agent_id` and `counterpart_id`
///
/// # Example
/// ```
/// use economy_simulator_core_rs::{Agent, Environment, TransactionKind};
/// use economy_simulator_core_rs::models::{BankProfile, FirmProfile};
/// use economy_simulator_core_rs::settlement::{net_bilateral, NettingRule, NettingTerm, Replacement, Side};
///
/// let mut env = Environment::with_agents(vec![
///     Agent::firm("FIRM_1", FirmProfile::default()),
///     Agent::bank("BANK_1", BankProfile::new(0.0, 0.0)),
/// ])
/// .unwrap();
/// env.new_transaction(TransactionKind::Deposits, "", "FIRM_1", "BANK_1", 5.0, 0.0, 0, -1).unwrap();
/// env.new_transaction(TransactionKind::Loans, "", "BANK_1", "FIRM_1", 2.0, 0.0, 0, -1).unwrap();
///
/// let rule = NettingRule {
///     terms: vec![
///         NettingTerm::new(TransactionKind::Deposits, Side::To, 1.0),
///         NettingTerm::new(TransactionKind::Loans, Side::From, 1.0),
///     ],
///     surplus: Replacement { kind: TransactionKind::Deposits, interest_rate: 0.0 },
///     deficit: Replacement { kind: TransactionKind::Loans, interest_rate: 0.0 },
/// };
///
/// let outcome = net_bilateral(&mut env, "FIRM_1", "BANK_1", &rule, 1).unwrap();
/// assert_eq!(outcome.balance, 3.0);
/// assert_eq!(env.num_transactions(), 1);
/// ```
pub fn net_bilateral(
    env: &mut Environment,
    agent_id: &str,
    counterpart_id: &str,
    rule: &NettingRule,
    time: usize,
) -> Result<NetOutcome, LedgerError> {
    if agent_id == counterpart_id {
        return Err(LedgerError::SelfTransaction(agent_id.to_string()));
    }
    for id in [agent_id, counterpart_id] {
        if env.agent(id).is_none() {
            return Err(LedgerError::UnknownAgent(id.to_string()));
        }
    }

    let mut balance = 0.0;
    let mut scanned: Vec<&Transaction> = Vec::new();
    for tx in env.entries_of(agent_id) {
        if let Some(term) = rule
            .terms
            .iter()
            .find(|term| term.matches(tx, agent_id, counterpart_id))
        {
            balance += tx.signed_amount_for(agent_id) * term.unit_value;
            scanned.push(tx);
        }
    }

    let canonical = if balance > 0.0 {
        Some((rule.surplus, agent_id, counterpart_id, balance))
    } else if balance < 0.0 {
        Some((rule.deficit, counterpart_id, agent_id, -balance))
    } else {
        None
    };

    if let ([only], Some((replacement, from, to, amount))) = (scanned.as_slice(), canonical) {
        if only.kind() == replacement.kind
            && only.from() == from
            && only.to() == to
            && only.amount() == amount
            && only.interest_rate() == replacement.interest_rate
        {
            return Ok(NetOutcome {
                balance,
                removed: Vec::new(),
                replacement: Some(only.id()),
                unchanged: true,
            });
        }
    }

    let ids: Vec<TransactionId> = scanned.iter().map(|tx| tx.id()).collect();
    let removed = env.remove_transactions(&ids)?;

    let replacement = match canonical {
        Some((replacement, from, to, amount)) => Some(env.new_transaction(
            replacement.kind,
            "",
            from,
            to,
            amount,
            replacement.interest_rate,
            time,
            OPEN_ENDED,
        )?),
        None => None,
    };

    Ok(NetOutcome {
        balance,
        removed,
        replacement,
        unchanged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::agent::{Agent, BankProfile, FirmProfile, HouseholdProfile};

    fn deposits_rule() -> NettingRule {
        NettingRule {
            terms: vec![
                NettingTerm::new(TransactionKind::Deposits, Side::To, 1.0),
                NettingTerm::new(TransactionKind::Loans, Side::From, 1.0),
            ],
            surplus: Replacement {
                kind: TransactionKind::Deposits,
                interest_rate: 0.01,
            },
            deficit: Replacement {
                kind: TransactionKind::Loans,
                interest_rate: 0.05,
            },
        }
    }

    fn economy() -> Environment {
        Environment::with_agents(vec![
            Agent::household("HH_1", HouseholdProfile::new(10.0, 0.5)),
            Agent::firm("FIRM_1", FirmProfile::default()),
            Agent::bank("BANK_1", BankProfile::new(0.01, 0.05)),
        ])
        .unwrap()
    }

    #[test]
    fn test_deficit_becomes_single_loan() {
        let mut env = economy();
        env.new_transaction(TransactionKind::Deposits, "", "FIRM_1", "BANK_1", 2.0, 0.01, 0, -1)
            .unwrap();
        env.new_transaction(TransactionKind::Loans, "", "BANK_1", "FIRM_1", 7.0, 0.05, 0, -1)
            .unwrap();

        let outcome = net_bilateral(&mut env, "FIRM_1", "BANK_1", &deposits_rule(), 3).unwrap();
        assert_eq!(outcome.balance, -5.0);
        assert_eq!(outcome.entries_removed(), 2);

        let id = outcome.replacement.unwrap();
        let loan = env.transaction(id).unwrap();
        assert_eq!(loan.kind(), TransactionKind::Loans);
        assert_eq!((loan.from(), loan.to()), ("BANK_1", "FIRM_1"));
        assert_eq!(loan.amount(), 5.0);
        assert_eq!(loan.interest_rate(), 0.05);
        assert_eq!(loan.origin_time(), 3);
        env.check_consistency().unwrap();
    }

    #[test]
    fn test_zero_balance_leaves_nothing() {
        let mut env = economy();
        env.new_transaction(TransactionKind::Deposits, "", "FIRM_1", "BANK_1", 4.0, 0.0, 0, -1)
            .unwrap();
        env.new_transaction(TransactionKind::Loans, "", "BANK_1", "FIRM_1", 4.0, 0.0, 0, -1)
            .unwrap();

        let outcome = net_bilateral(&mut env, "FIRM_1", "BANK_1", &deposits_rule(), 0).unwrap();
        assert_eq!(outcome.balance, 0.0);
        assert!(outcome.replacement.is_none());
        assert_eq!(env.num_transactions(), 0);
    }

    #[test]
    fn test_other_pairs_untouched() {
        let mut env = economy();
        let household_deposit = env
            .new_transaction(TransactionKind::Deposits, "", "HH_1", "BANK_1", 9.0, 0.0, 0, -1)
            .unwrap();
        env.new_transaction(TransactionKind::Deposits, "", "FIRM_1", "BANK_1", 1.0, 0.0, 0, -1)
            .unwrap();

        net_bilateral(&mut env, "FIRM_1", "BANK_1", &deposits_rule(), 0).unwrap();
        assert!(env.transaction(household_deposit).is_some());
    }

    #[test]
    fn test_second_pass_is_noop() {
        let mut env = economy();
        env.new_transaction(TransactionKind::Deposits, "", "FIRM_1", "BANK_1", 5.0, 0.0, 0, -1)
            .unwrap();
        env.new_transaction(TransactionKind::Deposits, "", "FIRM_1", "BANK_1", 1.0, 0.0, 0, -1)
            .unwrap();

        let first = net_bilateral(&mut env, "FIRM_1", "BANK_1", &deposits_rule(), 0).unwrap();
        let second = net_bilateral(&mut env, "FIRM_1", "BANK_1", &deposits_rule(), 1).unwrap();

        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert_eq!(second.replacement, first.replacement);
        assert!(second.removed.is_empty());
        assert_eq!(env.num_transactions(), 1);
    }

    #[test]
    fn test_self_netting_rejected() {
        let mut env = economy();
        assert_eq!(
            net_bilateral(&mut env, "BANK_1", "BANK_1", &deposits_rule(), 0).unwrap_err(),
            LedgerError::SelfTransaction("BANK_1".to_string())
        );
    }
}
