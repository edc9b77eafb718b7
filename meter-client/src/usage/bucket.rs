//! Grouping of readings into hour-of-day and calendar-day buckets.

use time::{Date, Duration};

use super::calculator::{usage_with_recharge, RunningBalance};
use crate::domain::Reading;

pub const HOURS_PER_DAY: usize = 24;

/// Balances observed within each hour of one civil day, in timestamp order.
#[derive(Debug, Default)]
pub struct HourGroups {
    groups: [Vec<f64>; HOURS_PER_DAY],
}

impl HourGroups {
    /// Group one day's readings by hour of day. Readings must already be in
    /// timestamp order; duplicates keep their arrival order within a group.
    pub fn from_readings(readings: &[Reading]) -> Self {
        let mut groups: [Vec<f64>; HOURS_PER_DAY] = Default::default();
        for reading in readings {
            groups[reading.ts.hour() as usize].push(reading.balance);
        }
        Self { groups }
    }

    /// Representative balance per hour: the first sample for hour 0, the
    /// last sample everywhere else. Hour 0 must expose the day's opening
    /// value so that since-midnight usage can reference the previous day's
    /// close; every later hour is compared to the end of the hour before it.
    /// An empty hour is `None`, never zero.
    pub fn representatives(&self) -> [Option<f64>; HOURS_PER_DAY] {
        let mut out = [None; HOURS_PER_DAY];
        for (hour, group) in self.groups.iter().enumerate() {
            out[hour] = if hour == 0 {
                group.first().copied()
            } else {
                group.last().copied()
            };
        }
        out
    }

    /// Usage attributed to each hour.
    ///
    /// Hour 0 runs against the cross-midnight anchor; every other hour runs
    /// against the last balance of the previous hour. A populated hour with
    /// no reference (no anchor, or an empty predecessor) reports zero.
    pub fn hourly_usage(&self, midnight_anchor: Option<f64>) -> [f64; HOURS_PER_DAY] {
        let mut usage = [0.0; HOURS_PER_DAY];
        for hour in 0..HOURS_PER_DAY {
            let group = &self.groups[hour];
            if group.is_empty() {
                continue;
            }
            let reference = if hour == 0 {
                midnight_anchor
            } else {
                self.groups[hour - 1].last().copied()
            };
            if let Some(reference) = reference {
                usage[hour] = usage_with_recharge(group.iter().copied(), Some(reference));
            }
        }
        usage
    }
}

/// One calendar-day bucket in a multi-day window.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date: Date,
    /// Last balance observed that day; `None` when the day has no readings.
    pub last_balance: Option<f64>,
    pub usage: f64,
}

/// Continuous day buckets over `[start, end]` inclusive.
///
/// `readings` must cover the window in timestamp order and `anchor` is the
/// last balance known before the window opened. Each day's usage is the
/// recharge-aware walk over that day's samples, referenced against the
/// baseline carried in from earlier days (or the anchor); days without
/// readings keep the baseline and report zero.
pub fn day_buckets(
    start: Date,
    end: Date,
    readings: &[Reading],
    anchor: Option<f64>,
) -> Vec<DayBucket> {
    let mut buckets = Vec::new();
    let mut idx = 0;
    let mut carried = anchor;
    let mut date = start;
    while date <= end {
        let mut state = RunningBalance::anchored(carried);
        let mut last_balance = None;
        while idx < readings.len() && readings[idx].ts.date() == date {
            state.observe(readings[idx].balance);
            last_balance = Some(readings[idx].balance);
            idx += 1;
        }
        buckets.push(DayBucket {
            date,
            last_balance,
            usage: state.total_usage(),
        });
        carried = state.last_balance();
        date += Duration::days(1);
    }
    buckets
}
