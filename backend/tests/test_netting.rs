//! Netting Tests
//!
//! Deposit/loan consolidation per (bank, customer) and labour/goods
//! consolidation into capital per (firm, household).

use economy_simulator_core_rs::models::{
    BankProfile, FirmProfile, HouseholdProfile, PRICE_OF_GOODS, PRICE_OF_LABOUR,
};
use economy_simulator_core_rs::settlement::{net_bilateral, NettingRule, NettingTerm, Replacement, Side};
use economy_simulator_core_rs::{Agent, Environment, RngManager, TransactionKind, Updater, UpdaterConfig};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn economy() -> Environment {
    Environment::with_agents(vec![
        Agent::household("HH_1", HouseholdProfile::new(10.0, 0.5)),
        Agent::firm("FIRM_1", FirmProfile::default()),
        Agent::bank("BANK_1", BankProfile::new(0.01, 0.05)),
    ])
    .unwrap()
}

fn updater() -> Updater {
    Updater::new(UpdaterConfig::default(), RngManager::new(1))
}

fn deposit(env: &mut Environment, from: &str, amount: f64) {
    env.new_transaction(TransactionKind::Deposits, "", from, "BANK_1", amount, 0.01, 0, -1)
        .unwrap();
}

fn loan(env: &mut Environment, to: &str, amount: f64) {
    env.new_transaction(TransactionKind::Loans, "", "BANK_1", to, amount, 0.05, 0, -1)
        .unwrap();
}

fn entries_between<'a>(env: &'a Environment, a: &str, b: &str) -> Vec<&'a economy_simulator_core_rs::Transaction> {
    env.entries_of(a)
        .into_iter()
        .filter(|tx| tx.involves(b))
        .collect()
}

// ============================================================================
// Deposits and Loans
// ============================================================================

#[test]
fn test_deposits_and_loan_collapse_to_single_deposit() {
    // Deposits 5 + 3 + 2, loan 4: one deposit of 6 remains
    let mut env = economy();
    deposit(&mut env, "FIRM_1", 5.0);
    deposit(&mut env, "FIRM_1", 3.0);
    deposit(&mut env, "FIRM_1", 2.0);
    loan(&mut env, "FIRM_1", 4.0);

    let summary = updater().net_loans_deposits(&mut env, 1).unwrap();
    assert_eq!(summary.removed, 4);
    assert_eq!(summary.created, 1);

    let remaining = entries_between(&env, "FIRM_1", "BANK_1");
    assert_eq!(remaining.len(), 1);
    let entry = remaining[0];
    assert_eq!(entry.kind(), TransactionKind::Deposits);
    assert_eq!((entry.from(), entry.to()), ("FIRM_1", "BANK_1"));
    assert_eq!(entry.amount(), 6.0);
    assert_eq!(entry.interest_rate(), 0.01);
    assert_eq!(entry.origin_time(), 1);
    env.check_consistency().unwrap();
}

#[test]
fn test_household_deficit_becomes_loan_at_loan_rate() {
    let mut env = economy();
    deposit(&mut env, "HH_1", 20.0);
    loan(&mut env, "HH_1", 30.0);

    updater().net_loans_deposits(&mut env, 0).unwrap();

    let remaining = entries_between(&env, "HH_1", "BANK_1");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].kind(), TransactionKind::Loans);
    assert_eq!((remaining[0].from(), remaining[0].to()), ("BANK_1", "HH_1"));
    assert_eq!(remaining[0].amount(), 10.0);
    assert_eq!(remaining[0].interest_rate(), 0.05);
}

#[test]
fn test_netting_runs_even_for_a_single_entry() {
    // An entry at a stale rate is replaced at the bank's current terms
    let mut env = economy();
    env.new_transaction(TransactionKind::Deposits, "", "HH_1", "BANK_1", 8.0, 0.0, 0, -1)
        .unwrap();

    let summary = updater().net_loans_deposits(&mut env, 2).unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.created, 1);
    let remaining = entries_between(&env, "HH_1", "BANK_1");
    assert_eq!(remaining[0].interest_rate(), 0.01);
}

#[test]
fn test_second_netting_pass_changes_nothing() {
    let mut env = economy();
    deposit(&mut env, "FIRM_1", 5.0);
    loan(&mut env, "FIRM_1", 1.5);
    deposit(&mut env, "HH_1", 3.0);

    let mut updater = updater();
    updater.net_loans_deposits(&mut env, 0).unwrap();
    let ids_after_first: Vec<u64> = env.transactions().map(|tx| tx.id().value()).collect();

    let second = updater.net_loans_deposits(&mut env, 0).unwrap();
    let ids_after_second: Vec<u64> = env.transactions().map(|tx| tx.id().value()).collect();

    assert_eq!(second.removed, 0);
    assert_eq!(second.created, 0);
    assert_eq!(ids_after_first, ids_after_second);
}

// ============================================================================
// Labour and Goods into Capital
// ============================================================================

#[test]
fn test_balanced_labour_and_goods_leave_no_capital() {
    // Labour 10 at price 2 against goods 2 at price 10: balance exactly zero
    let mut env = economy();
    env.set_parameter(PRICE_OF_LABOUR, 2.0);
    env.set_parameter(PRICE_OF_GOODS, 10.0);
    env.new_transaction(TransactionKind::Labour, "", "FIRM_1", "HH_1", 10.0, 0.0, 0, -1)
        .unwrap();
    env.new_transaction(TransactionKind::Goods, "", "HH_1", "FIRM_1", 2.0, 0.0, 0, -1)
        .unwrap();

    let summary = updater().net_labour_goods(&mut env, 0).unwrap();
    assert_eq!(summary.removed, 2);
    assert_eq!(summary.created, 0);
    assert!(entries_between(&env, "HH_1", "FIRM_1").is_empty());
}

#[test]
fn test_unspent_wage_becomes_capital_owed_to_household() {
    let mut env = economy();
    env.set_parameter(PRICE_OF_LABOUR, 2.0);
    env.set_parameter(PRICE_OF_GOODS, 10.0);
    env.new_transaction(TransactionKind::Labour, "", "FIRM_1", "HH_1", 10.0, 0.0, 0, -1)
        .unwrap();
    env.new_transaction(TransactionKind::Goods, "", "HH_1", "FIRM_1", 1.0, 0.0, 0, -1)
        .unwrap();

    updater().net_labour_goods(&mut env, 0).unwrap();

    let remaining = entries_between(&env, "HH_1", "FIRM_1");
    assert_eq!(remaining.len(), 1);
    let capital = remaining[0];
    assert_eq!(capital.kind(), TransactionKind::Capital);
    assert_eq!((capital.from(), capital.to()), ("FIRM_1", "HH_1"));
    assert_eq!(capital.amount(), 10.0);
    assert_eq!(capital.interest_rate(), 0.0);
    assert!(capital.is_open_ended());
}

#[test]
fn test_existing_capital_is_folded_in() {
    let mut env = economy();
    env.set_parameter(PRICE_OF_LABOUR, 1.0);
    env.set_parameter(PRICE_OF_GOODS, 10.0);
    env.new_transaction(TransactionKind::Capital, "", "HH_1", "FIRM_1", 4.0, 0.0, 0, -1)
        .unwrap();
    env.new_transaction(TransactionKind::Goods, "", "HH_1", "FIRM_1", 1.0, 0.0, 0, -1)
        .unwrap();

    updater().net_labour_goods(&mut env, 0).unwrap();

    let remaining = entries_between(&env, "HH_1", "FIRM_1");
    assert_eq!(remaining.len(), 1);
    assert_eq!((remaining[0].from(), remaining[0].to()), ("HH_1", "FIRM_1"));
    assert_eq!(remaining[0].amount(), 14.0);
}

#[test]
fn test_capital_netting_requires_prices() {
    let mut env = economy();
    env.set_parameter(PRICE_OF_GOODS, 10.0);
    let err = updater().net_labour_goods(&mut env, 0).unwrap_err();
    assert_eq!(
        err,
        economy_simulator_core_rs::SimulationError::MissingParameter(PRICE_OF_LABOUR.to_string())
    );
}

// ============================================================================
// Conservation Properties
// ============================================================================

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

proptest! {
    #[test]
    fn prop_deposit_netting_preserves_net_worth(
        entries in prop::collection::vec((any::<bool>(), 0.0f64..1_000.0), 0..20)
    ) {
        let mut env = economy();
        for (is_deposit, amount) in &entries {
            if *is_deposit {
                deposit(&mut env, "FIRM_1", *amount);
            } else {
                loan(&mut env, "FIRM_1", *amount);
            }
        }
        let firm_before = env.net_worth("FIRM_1").unwrap();
        let bank_before = env.net_worth("BANK_1").unwrap();

        let outcome = net_bilateral(&mut env, "FIRM_1", "BANK_1", &deposits_rule(), 1).unwrap();

        prop_assert_eq!(outcome.balance, firm_before);
        prop_assert!((env.net_worth("FIRM_1").unwrap() - firm_before).abs() <= 1e-9);
        prop_assert!((env.net_worth("BANK_1").unwrap() - bank_before).abs() <= 1e-9);
        prop_assert!(entries_between(&env, "FIRM_1", "BANK_1").len() <= 1);
        env.check_consistency().unwrap();

        // Idempotent second pass
        let again = net_bilateral(&mut env, "FIRM_1", "BANK_1", &deposits_rule(), 2).unwrap();
        prop_assert!(again.removed.is_empty());
    }

    #[test]
    fn prop_capital_netting_preserves_net_worth(
        labour in 0.0f64..100.0,
        goods in 0u32..20,
        wage in 0.1f64..50.0,
        goods_price in 0.1f64..50.0,
    ) {
        let mut env = economy();
        env.set_parameter(PRICE_OF_LABOUR, wage);
        env.set_parameter(PRICE_OF_GOODS, goods_price);
        env.new_transaction(TransactionKind::Labour, "", "FIRM_1", "HH_1", labour, 0.0, 0, -1).unwrap();
        env.new_transaction(TransactionKind::Goods, "", "HH_1", "FIRM_1", goods as f64, 0.0, 0, -1).unwrap();

        let household_before = env.net_worth("HH_1").unwrap();
        let firm_before = env.net_worth("FIRM_1").unwrap();

        updater().net_labour_goods(&mut env, 0).unwrap();

        let tolerance = 1e-9 * (1.0 + household_before.abs());
        prop_assert!((env.net_worth("HH_1").unwrap() - household_before).abs() <= tolerance);
        prop_assert!((env.net_worth("FIRM_1").unwrap() - firm_before).abs() <= tolerance);
        for tx in env.transactions() {
            prop_assert!(tx.amount() >= 0.0);
            prop_assert_eq!(tx.kind(), TransactionKind::Capital);
        }
    }
}
