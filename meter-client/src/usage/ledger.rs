//! Recharge ledger reconstruction.
//!
//! Top-ups are never reported by the meter; they only show up as upward
//! jumps between adjacent balance readings. The ledger is rebuilt from the
//! raw reading stream on every query, filtering out jumps too small or too
//! irregular to be sold credit.

use crate::domain::{Reading, RechargeEvent};

/// Minimum balance rise considered a candidate top-up; smaller rises are
/// presumed metering jitter.
pub const NOISE_FLOOR: f64 = 8.0;

/// Credit is sold in multiples of this denomination.
pub const DENOMINATION: f64 = 10.0;

/// Maximum gap between the rounded estimate and the observed rise. Absorbs
/// consumption between the top-up and the next poll.
pub const ESTIMATE_TOLERANCE: f64 = 5.0;

/// Classify a balance rise. Returns the estimated top-up amount, or `None`
/// when the rise does not look like a sold denomination.
pub fn classify_increase(increase: f64) -> Option<i64> {
    if increase < NOISE_FLOOR {
        return None;
    }
    let estimate = (increase / DENOMINATION).round_ties_even() * DENOMINATION;
    if estimate >= DENOMINATION && (estimate - increase).abs() <= ESTIMATE_TOLERANCE {
        Some(estimate as i64)
    } else {
        None
    }
}

/// Rebuild the recharge ledger from a chronological reading sequence.
///
/// Events come back newest first. `limit` truncates after ordering, so a low
/// limit drops the oldest events rather than a slice of the newest; zero
/// means unlimited.
pub fn reconstruct(readings: &[Reading], limit: usize) -> Vec<RechargeEvent> {
    let mut events = Vec::new();
    for pair in readings.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.balance <= prev.balance {
            continue;
        }
        if let Some(amount) = classify_increase(curr.balance - prev.balance) {
            events.push(RechargeEvent {
                ts: curr.ts,
                meter_id: curr.meter_id.clone(),
                amount,
                balance_before: prev.balance,
                balance_after: curr.balance,
            });
        }
    }
    events.reverse();
    if limit > 0 && events.len() > limit {
        events.truncate(limit);
    }
    events
}
