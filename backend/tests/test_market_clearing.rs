//! Market Clearing Tests
//!
//! Equilibrium price search against agent schedules, and rationing
//! conservation properties.

use economy_simulator_core_rs::market::{ration, ration_abstract, Match, Participant, Position};
use economy_simulator_core_rs::models::{DemandsLabour, FirmProfile, HouseholdProfile, SuppliesLabour};
use economy_simulator_core_rs::{Market, MarketClearing, MarketError, SearchParams};
use proptest::prelude::*;
use std::collections::HashMap;

// ============================================================================
// Test Helpers
// ============================================================================

fn endowed(labour: f64) -> HouseholdProfile {
    let mut profile = HouseholdProfile::new(labour, 0.5);
    profile.sweep_labour = labour;
    profile
}

fn excess_at(households: &[HouseholdProfile], firms: &[FirmProfile], price: f64) -> f64 {
    let supply: f64 = households.iter().map(|h| h.supply_of_labour(price)).sum();
    let demand: f64 = firms.iter().map(|f| f.demand_for_labour(price, 10.0)).sum();
    supply - demand
}

fn clear(households: &[HouseholdProfile], firms: &[FirmProfile], params: &SearchParams) -> Result<f64, MarketError> {
    let sellers: Vec<Participant<'_>> = households
        .iter()
        .map(|h| Participant::new("HH", move |p: f64| h.supply_of_labour(p)))
        .collect();
    let buyers: Vec<Participant<'_>> = firms
        .iter()
        .map(|f| Participant::new("FIRM", move |p: f64| f.demand_for_labour(p, 10.0)))
        .collect();
    Market::new().find_equilibrium_price(&sellers, &buyers, params)
}

fn traded_by(matches: &[Match]) -> (HashMap<String, f64>, HashMap<String, f64>) {
    let mut supplied = HashMap::new();
    let mut demanded = HashMap::new();
    for m in matches {
        *supplied.entry(m.supplier.clone()).or_insert(0.0) += m.quantity;
        *demanded.entry(m.demander.clone()).or_insert(0.0) += m.quantity;
    }
    (supplied, demanded)
}

fn positions_from(quantities: &[i32]) -> Vec<Position> {
    quantities
        .iter()
        .enumerate()
        .map(|(i, q)| Position::new(format!("A{}", i), *q as f64))
        .collect()
}

// ============================================================================
// Tatonnement
// ============================================================================

#[test]
fn test_labour_market_clears_within_tolerance() {
    let households = vec![endowed(10.0), endowed(10.0)];
    let firms = vec![FirmProfile::default()];
    let params = SearchParams::default();

    let price = clear(&households, &firms, &params).unwrap();
    assert!(excess_at(&households, &firms, price).abs() <= params.tolerance);
    assert!((price - 75.0 / 20f64.sqrt()).abs() < 0.01);
}

#[test]
fn test_several_firms_share_the_market() {
    let households = vec![endowed(5.0), endowed(12.0), endowed(3.0)];
    let firms = vec![
        FirmProfile::default(),
        FirmProfile {
            total_factor_productivity: 30.0,
            ..FirmProfile::default()
        },
        FirmProfile::default().with_labour_capacity(2.0),
    ];
    let params = SearchParams {
        tolerance: 1e-6,
        ..SearchParams::default()
    };

    let price = clear(&households, &firms, &params).unwrap();
    assert!(excess_at(&households, &firms, price).abs() <= 1e-6);
}

#[test]
fn test_start_price_is_honoured() {
    let households = vec![endowed(20.0)];
    let firms = vec![FirmProfile::default()];
    let params = SearchParams {
        start_price: 75.0 / 20f64.sqrt(),
        ..SearchParams::default()
    };
    let price = clear(&households, &firms, &params).unwrap();
    assert_eq!(price, params.start_price);
}

#[test]
fn test_no_households_leaves_price_unchanged() {
    let firms = vec![FirmProfile::default()];
    let params = SearchParams {
        start_price: 4.0,
        ..SearchParams::default()
    };
    assert_eq!(clear(&[], &firms, &params).unwrap(), 4.0);
}

#[test]
fn test_invalid_params_rejected_before_search() {
    let params = SearchParams {
        resolution: -1.0,
        ..SearchParams::default()
    };
    assert!(matches!(
        clear(&[endowed(1.0)], &[FirmProfile::default()], &params),
        Err(MarketError::InvalidParameters(_))
    ));
}

proptest! {
    #[test]
    fn prop_equilibrium_within_tolerance(
        labour in prop::collection::vec(1.0f64..50.0, 1..5),
        tfp in 1.0f64..50.0,
    ) {
        let households: Vec<HouseholdProfile> = labour.iter().map(|l| endowed(*l)).collect();
        let firms = vec![FirmProfile {
            total_factor_productivity: tfp,
            ..FirmProfile::default()
        }];
        let params = SearchParams::default();

        let price = clear(&households, &firms, &params).unwrap();
        prop_assert!(price > 0.0);
        prop_assert!(excess_at(&households, &firms, price).abs() <= params.tolerance);
    }
}

// ============================================================================
// Rationing
// ============================================================================

#[test]
fn test_ration_serves_demanders_in_order() {
    let matches = ration(&[
        Position::new("HH_1", 10.0),
        Position::new("HH_2", 10.0),
        Position::new("FIRM_1", -15.0),
        Position::new("FIRM_2", -15.0),
    ]);
    let (supplied, demanded) = traded_by(&matches);
    assert_eq!(supplied["HH_1"], 10.0);
    assert_eq!(supplied["HH_2"], 10.0);
    assert_eq!(demanded["FIRM_1"], 15.0);
    assert_eq!(demanded["FIRM_2"], 5.0);
}

proptest! {
    #[test]
    fn prop_ration_never_exceeds_positions(quantities in prop::collection::vec(-50i32..50, 0..12)) {
        let positions = positions_from(&quantities);
        let matches = ration(&positions);
        let (supplied, demanded) = traded_by(&matches);

        for position in &positions {
            let q = position.quantity;
            if q > 0.0 {
                prop_assert!(supplied.get(&position.agent_id).copied().unwrap_or(0.0) <= q);
            } else if q < 0.0 {
                prop_assert!(demanded.get(&position.agent_id).copied().unwrap_or(0.0) <= -q);
            }
        }

        let total_supply: f64 = positions.iter().map(|p| p.quantity.max(0.0)).sum();
        let total_demand: f64 = positions.iter().map(|p| (-p.quantity).max(0.0)).sum();
        let total: f64 = matches.iter().map(|m| m.quantity).sum();
        prop_assert_eq!(total, total_supply.min(total_demand));
        prop_assert!(matches.iter().all(|m| m.quantity > 0.0));
    }

    #[test]
    fn prop_unit_weight_abstract_clears_the_short_side(quantities in prop::collection::vec(-50i32..50, 0..12)) {
        let positions = positions_from(&quantities);
        let matches = ration_abstract(&positions, &|_: &str, _: &str| 1.0, &|_: &str, _: &str| true);

        let total_supply: f64 = positions.iter().map(|p| p.quantity.max(0.0)).sum();
        let total_demand: f64 = positions.iter().map(|p| (-p.quantity).max(0.0)).sum();
        let total: f64 = matches.iter().map(|m| m.quantity).sum();
        prop_assert_eq!(total, total_supply.min(total_demand));

        // Whole-unit positions give whole-unit trades
        prop_assert!(matches.iter().all(|m| m.quantity.fract() == 0.0));
    }
}
