//! Equilibrium price search
//!
//! The excess supply `E(p) = sum(supply_i(p)) - sum(demand_j(p))` is driven to
//! within `tolerance` of zero in two phases:
//!
//! 1. **Expansion**: starting from the start price, step up while demand
//!    exceeds supply and down while supply exceeds demand. The step starts at
//!    `resolution` and grows by `amplification` each time the sign of the
//!    excess is unchanged. A downward step that would cross zero halves the
//!    price instead.
//! 2. **Bisection**: once the sign flips, the root is bracketed and the
//!    interval is halved until the tolerance is met.
//!
//! Every evaluation of `E` counts against `max_iterations`. Running out is a
//! [`MarketError::NoConvergence`], never a stale price.

use super::{MarketError, Participant, SearchParams};

/// Default start when the caller has no preference
const FALLBACK_START_PRICE: f64 = 1.0;

/// Extremes at which a side is checked for offering nothing at all
const IDLE_FLOOR_PRICE: f64 = f64::MIN_POSITIVE;
const IDLE_CEILING_PRICE: f64 = 1e150;

struct ExcessSupply<'s, 'a> {
    sellers: &'s [Participant<'a>],
    buyers: &'s [Participant<'a>],
    evaluations: usize,
}

impl ExcessSupply<'_, '_> {
    fn at(&mut self, price: f64) -> Result<f64, MarketError> {
        self.evaluations += 1;
        let supply: f64 = self.sellers.iter().map(|s| s.quantity_at(price)).sum();
        let demand: f64 = self.buyers.iter().map(|b| b.quantity_at(price)).sum();
        let excess = supply - demand;
        if !excess.is_finite() {
            return Err(MarketError::NonFiniteExcess { price });
        }
        Ok(excess)
    }
}

/// A side whose schedules all offer zero at the start price and at both
/// extremes has nothing to trade at any price.
fn is_idle(side: &[Participant<'_>], start: f64) -> bool {
    [IDLE_FLOOR_PRICE, start, IDLE_CEILING_PRICE]
        .iter()
        .all(|price| side.iter().map(|p| p.quantity_at(*price)).sum::<f64>() == 0.0)
}

/// Find a price where aggregate supply and demand agree within tolerance
///
/// Returns the start price untouched when either side of the market is empty
/// or offers nothing at any price.
pub fn find_equilibrium_price(
    sellers: &[Participant<'_>],
    buyers: &[Participant<'_>],
    params: &SearchParams,
) -> Result<f64, MarketError> {
    params.validate()?;

    let start = if params.start_price > 0.0 {
        params.start_price
    } else {
        FALLBACK_START_PRICE
    };

    if sellers.is_empty() || buyers.is_empty() {
        return Ok(start);
    }
    if is_idle(sellers, start) || is_idle(buyers, start) {
        return Ok(start);
    }

    let mut excess_at = ExcessSupply {
        sellers,
        buyers,
        evaluations: 0,
    };

    let mut price = start;
    let mut excess = excess_at.at(price)?;
    if excess.abs() <= params.tolerance {
        return Ok(price);
    }

    // Phase 1: expand until the excess changes sign
    let mut step = params.resolution;
    let (mut low, mut low_excess, mut high) = loop {
        if excess_at.evaluations >= params.max_iterations {
            return Err(MarketError::NoConvergence {
                iterations: excess_at.evaluations,
                price,
                excess,
            });
        }

        let candidate = if excess < 0.0 {
            price + step
        } else if price - step > 0.0 {
            price - step
        } else {
            price / 2.0
        };
        if !(candidate.is_finite() && candidate > 0.0) {
            return Err(MarketError::NoConvergence {
                iterations: excess_at.evaluations,
                price,
                excess,
            });
        }

        let candidate_excess = excess_at.at(candidate)?;
        if candidate_excess.abs() <= params.tolerance {
            return Ok(candidate);
        }

        if (candidate_excess < 0.0) != (excess < 0.0) {
            if candidate < price {
                break (candidate, candidate_excess, price);
            }
            break (price, excess, candidate);
        }

        price = candidate;
        excess = candidate_excess;
        step *= params.amplification;
    };

    // Phase 2: bisect the bracket [low, high]
    loop {
        let mid = low + (high - low) / 2.0;
        if excess_at.evaluations >= params.max_iterations || mid <= low || mid >= high {
            return Err(MarketError::NoConvergence {
                iterations: excess_at.evaluations,
                price: mid,
                excess: low_excess,
            });
        }

        let mid_excess = excess_at.at(mid)?;
        if mid_excess.abs() <= params.tolerance {
            return Ok(mid);
        }

        if (mid_excess < 0.0) == (low_excess < 0.0) {
            low = mid;
            low_excess = mid_excess;
        } else {
            high = mid;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SearchParams {
        SearchParams::default()
    }

    #[test]
    fn test_already_cleared_at_start() {
        let sellers = vec![Participant::new("S", |_p: f64| 5.0)];
        let buyers = vec![Participant::new("B", |p: f64| 10.0 / p)];
        let p = SearchParams {
            start_price: 2.0,
            ..params()
        };
        assert_eq!(find_equilibrium_price(&sellers, &buyers, &p).unwrap(), 2.0);
    }

    #[test]
    fn test_searches_downward_when_supply_exceeds_demand() {
        // Clears at p = 0.25
        let sellers = vec![Participant::new("S", |_p: f64| 40.0)];
        let buyers = vec![Participant::new("B", |p: f64| 10.0 / p)];
        let price = find_equilibrium_price(&sellers, &buyers, &params()).unwrap();
        assert!((40.0 - 10.0 / price).abs() <= 0.001);
        assert!(price < 1.0);
    }

    #[test]
    fn test_searches_upward_when_demand_exceeds_supply() {
        let sellers = vec![Participant::new("S", |_p: f64| 20.0)];
        let buyers = vec![Participant::new("B", |p: f64| 5625.0 / (p * p))];
        let price = find_equilibrium_price(&sellers, &buyers, &params()).unwrap();
        assert!((20.0 - 5625.0 / (price * price)).abs() <= 0.001);
    }

    #[test]
    fn test_empty_side_returns_start_price() {
        let sellers = vec![Participant::new("S", |_p: f64| 1.0)];
        let p = SearchParams {
            start_price: 3.5,
            ..params()
        };
        assert_eq!(find_equilibrium_price(&sellers, &[], &p).unwrap(), 3.5);
        assert_eq!(find_equilibrium_price(&[], &sellers, &params()).unwrap(), 1.0);
    }

    #[test]
    fn test_idle_side_returns_start_price() {
        let sellers = vec![Participant::new("S", |_p: f64| 10.0)];
        let buyers = vec![Participant::new("B", |p: f64| (10.0 / p).min(0.0))];
        let p = SearchParams {
            start_price: 2.5,
            ..params()
        };
        assert_eq!(find_equilibrium_price(&sellers, &buyers, &p).unwrap(), 2.5);

        let idle_sellers = vec![Participant::new("S", |_p: f64| 0.0)];
        let buyers = vec![Participant::new("B", |p: f64| 10.0 / p)];
        assert_eq!(find_equilibrium_price(&idle_sellers, &buyers, &params()).unwrap(), 1.0);
    }

    #[test]
    fn test_constant_gap_never_converges() {
        let sellers = vec![Participant::new("S", |_p: f64| 10.0)];
        let buyers = vec![Participant::new("B", |_p: f64| 1000.0)];
        let p = SearchParams {
            max_iterations: 50,
            ..params()
        };
        match find_equilibrium_price(&sellers, &buyers, &p) {
            Err(MarketError::NoConvergence { iterations, excess, .. }) => {
                assert_eq!(iterations, 50);
                assert_eq!(excess, -990.0);
            }
            other => panic!("expected NoConvergence, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_excess_is_reported() {
        let sellers = vec![Participant::new("S", |_p: f64| 10.0)];
        let buyers = vec![Participant::new("B", |_p: f64| f64::INFINITY)];
        assert_eq!(
            find_equilibrium_price(&sellers, &buyers, &params()),
            Err(MarketError::NonFiniteExcess { price: 1.0 })
        );
    }

    #[test]
    fn test_search_is_deterministic() {
        let sellers = vec![Participant::new("S", |p: f64| 3.0 * p)];
        let buyers = vec![Participant::new("B", |p: f64| 100.0 - p)];
        let a = find_equilibrium_price(&sellers, &buyers, &params()).unwrap();
        let b = find_equilibrium_price(&sellers, &buyers, &params()).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
        assert!((4.0 * a - 100.0).abs() <= 0.001);
    }
}
