//! Recharge-aware consumption arithmetic.
//!
//! A prepaid balance only falls while power is consumed; any rise is a
//! top-up. Usage is therefore accumulated from drops only, and every rise
//! moves the baseline without ever surfacing as negative consumption.

/// Accumulator threading a balance baseline through an ordered sample
/// sequence.
///
/// `total_usage` only grows, and only by `last_balance - current` when that
/// quantity is positive.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningBalance {
    last_balance: Option<f64>,
    total_usage: f64,
}

impl RunningBalance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a prior balance known before the window opened (the
    /// anchor reading), or from nothing when no anchor exists.
    pub fn anchored(anchor: Option<f64>) -> Self {
        Self {
            last_balance: anchor,
            total_usage: 0.0,
        }
    }

    /// Feed the next observed balance. Returns the usage attributed to this
    /// step: zero for the seeding sample and for recharges.
    pub fn observe(&mut self, balance: f64) -> f64 {
        match self.last_balance {
            None => {
                self.last_balance = Some(balance);
                0.0
            }
            Some(last) if balance > last => {
                // Top-up: move the baseline, attribute nothing.
                self.last_balance = Some(balance);
                0.0
            }
            Some(last) => {
                let step = last - balance;
                self.last_balance = Some(balance);
                self.total_usage += step;
                step
            }
        }
    }

    pub fn total_usage(&self) -> f64 {
        self.total_usage
    }

    pub fn last_balance(&self) -> Option<f64> {
        self.last_balance
    }
}

/// Total usage over `balances`, optionally anchored on a prior reading.
pub fn usage_with_recharge<I>(balances: I, anchor: Option<f64>) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut state = RunningBalance::anchored(anchor);
    for balance in balances {
        state.observe(balance);
    }
    state.total_usage()
}

/// Anchor-free positive-drop sum used by period-over-period comparisons.
///
/// Coarser than [`usage_with_recharge`]: the first sample of the window is
/// never charged against anything outside it, and the two computations are
/// not expected to reconcile where a recharge straddles a window edge.
pub fn monotonic_drop_total<I>(balances: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut prev: Option<f64> = None;
    let mut total = 0.0;
    for balance in balances {
        if let Some(p) = prev {
            let drop = p - balance;
            if drop > 0.0 {
                total += drop;
            }
        }
        prev = Some(balance);
    }
    total
}
