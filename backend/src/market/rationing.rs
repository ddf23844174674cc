//! Rationing: signed positions to bilateral matches
//!
//! Positions carry the sign convention of the whole market layer: a positive
//! quantity is supply, a negative one is demand. Zero and NaN positions take
//! no part. Matched quantities never exceed what either side offered.

use super::{Match, Position};

/// Remaining quantities at or below this are treated as exhausted
const RESIDUAL_EPSILON: f64 = 1e-12;

struct Side<'a> {
    agent_id: &'a str,
    remaining: f64,
}

fn split_sides(positions: &[Position]) -> (Vec<Side<'_>>, Vec<Side<'_>>) {
    let mut suppliers = Vec::new();
    let mut demanders = Vec::new();
    for position in positions {
        let q = position.quantity;
        if q > 0.0 {
            suppliers.push(Side {
                agent_id: &position.agent_id,
                remaining: q,
            });
        } else if q < 0.0 {
            demanders.push(Side {
                agent_id: &position.agent_id,
                remaining: -q,
            });
        }
    }
    (suppliers, demanders)
}

/// Greedy two-pointer matching in input order
///
/// The first supplier serves the first demander until one of them is
/// exhausted, then the pointer of the exhausted side advances.
///
/// # Example
/// ```
/// use economy_simulator_core_rs::market::{ration, Position};
///
/// let matches = ration(&[
///     Position::new("HH_1", 10.0),
///     Position::new("HH_2", 5.0),
///     Position::new("FIRM_1", -12.0),
/// ]);
/// assert_eq!(matches.len(), 2);
/// assert_eq!(matches[0].quantity, 10.0);
/// assert_eq!(matches[1].quantity, 2.0);
/// ```
pub fn ration(positions: &[Position]) -> Vec<Match> {
    let (mut suppliers, mut demanders) = split_sides(positions);
    let mut matches = Vec::new();

    let (mut i, mut j) = (0, 0);
    while i < suppliers.len() && j < demanders.len() {
        let quantity = suppliers[i].remaining.min(demanders[j].remaining);
        if !quantity.is_finite() {
            break;
        }

        matches.push(Match {
            supplier: suppliers[i].agent_id.to_string(),
            demander: demanders[j].agent_id.to_string(),
            quantity,
        });

        suppliers[i].remaining -= quantity;
        demanders[j].remaining -= quantity;
        if suppliers[i].remaining <= RESIDUAL_EPSILON {
            i += 1;
        }
        if demanders[j].remaining <= RESIDUAL_EPSILON {
            j += 1;
        }
    }

    matches
}

/// Matching under a caller-supplied compatibility policy
///
/// Every (supplier, demander) pair is scored with `weight`; pairs are visited
/// in descending weight (ties keep input order). A pair trades only when
/// `allow` accepts it and its weight is positive. The traded quantity is
/// `min(remaining supply, remaining demand) * weight`, weight clamped to 1.
pub fn ration_abstract(
    positions: &[Position],
    weight: &dyn Fn(&str, &str) -> f64,
    allow: &dyn Fn(&str, &str) -> bool,
) -> Vec<Match> {
    let (mut suppliers, mut demanders) = split_sides(positions);

    let mut pairs = Vec::with_capacity(suppliers.len() * demanders.len());
    for (si, s) in suppliers.iter().enumerate() {
        for (di, d) in demanders.iter().enumerate() {
            pairs.push((si, di, weight(s.agent_id, d.agent_id)));
        }
    }
    pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut matches = Vec::new();
    for (si, di, w) in pairs {
        if !(w > 0.0) {
            continue;
        }
        let (supplier, demander) = (suppliers[si].agent_id, demanders[di].agent_id);
        if !allow(supplier, demander) {
            continue;
        }

        let available = suppliers[si].remaining.min(demanders[di].remaining);
        if available <= RESIDUAL_EPSILON {
            continue;
        }
        let quantity = available * w.min(1.0);
        if !quantity.is_finite() {
            continue;
        }

        matches.push(Match {
            supplier: supplier.to_string(),
            demander: demander.to_string(),
            quantity,
        });
        suppliers[si].remaining -= quantity;
        demanders[di].remaining -= quantity;
    }

    matches
}
