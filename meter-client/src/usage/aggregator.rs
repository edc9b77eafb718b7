//! Window orchestration: pulls readings and anchors from the store, runs
//! them through the bucketizer and the consumption calculator, and shapes
//! the label/balance/usage series the query layer serves.

use std::sync::Arc;

use time::{Date, Duration};

use super::bucket::{day_buckets, HourGroups, HOURS_PER_DAY};
use super::cache::TtlCache;
use super::calculator::{monotonic_drop_total, usage_with_recharge};
use super::ledger;
use crate::db::{ReadingStore, StoreError};
use crate::domain::{civil, RechargeEvent};

/// Reporting window selector. Unknown strings map to month, preserving the
/// dispatch the query layer has always had.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn parse(input: &str) -> Self {
        match input {
            "day" => Period::Day,
            "week" => Period::Week,
            _ => Period::Month,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    /// Calendar days covered by the window.
    fn window_days(&self) -> i64 {
        match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
        }
    }
}

/// Index-aligned label/balance/usage series for one reporting window.
/// A `None` balance means the bucket had no readings, which is not the same
/// as a balance of zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsSeries {
    pub labels: Vec<String>,
    pub balances: Vec<Option<f64>>,
    pub usage: Vec<f64>,
}

/// Headline figures for one meter around a reference date.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiReport {
    pub current_balance: Option<f64>,
    pub target_date_last_balance: Option<f64>,
    pub yesterday_last_balance: Option<f64>,
    pub day_before_yesterday_last_balance: Option<f64>,
    pub usage_target: f64,
    pub usage_yesterday: f64,
    /// Estimated credit purchased today; only computed when the reference
    /// date is today, and floored at zero.
    pub recharge_today: Option<f64>,
}

/// Usage totals for the requested window against the immediately preceding
/// window of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodComparison {
    pub period: Period,
    pub current_usage: f64,
    pub previous_usage: f64,
}

/// Stateless per-request orchestrator over an injected store and an
/// injected TTL cache. Aggregation is deterministic over stored data, so a
/// cache-miss race recomputing a key yields identical results.
pub struct PeriodAggregator {
    store: Arc<dyn ReadingStore>,
    statistics_cache: TtlCache<StatisticsSeries>,
    kpi_cache: TtlCache<KpiReport>,
}

impl PeriodAggregator {
    pub fn new(store: Arc<dyn ReadingStore>, cache_ttl: std::time::Duration) -> Self {
        Self {
            store,
            statistics_cache: TtlCache::new(cache_ttl),
            kpi_cache: TtlCache::new(cache_ttl),
        }
    }

    /// Label/balance/usage series for the requested window. `reference`
    /// defaults to today. Day windows always yield 24 hourly buckets, week
    /// and month windows 7 and 30 daily buckets ending at the reference
    /// date, however sparse the underlying readings are.
    pub async fn statistics(
        &self,
        meter_id: &str,
        period: Period,
        reference: Option<Date>,
    ) -> Result<StatisticsSeries, StoreError> {
        let reference = reference.unwrap_or_else(|| civil::now().date());
        let key = format!("{}:{meter_id}:{reference}", period.as_str());
        if let Some(hit) = self.statistics_cache.get(&key) {
            return Ok(hit);
        }

        let series = match period {
            Period::Day => self.day_series(meter_id, reference).await?,
            Period::Week | Period::Month => {
                self.multi_day_series(meter_id, period, reference).await?
            }
        };
        self.statistics_cache.insert(key, series.clone());
        Ok(series)
    }

    async fn day_series(&self, meter_id: &str, date: Date) -> Result<StatisticsSeries, StoreError> {
        let start = civil::day_start(date);
        let end = civil::day_end(date);
        let readings = self.store.query_range(Some(meter_id), start, end).await?;
        let anchor = self
            .store
            .latest_before(meter_id, start)
            .await?
            .map(|r| r.balance);

        let groups = HourGroups::from_readings(&readings);
        Ok(StatisticsSeries {
            labels: (0..HOURS_PER_DAY).map(|h| format!("{h:02}")).collect(),
            balances: groups.representatives().to_vec(),
            usage: groups.hourly_usage(anchor).to_vec(),
        })
    }

    async fn multi_day_series(
        &self,
        meter_id: &str,
        period: Period,
        reference: Date,
    ) -> Result<StatisticsSeries, StoreError> {
        let start_date = reference - Duration::days(period.window_days() - 1);
        let start = civil::day_start(start_date);
        let end = civil::day_end(reference);
        let readings = self.store.query_range(Some(meter_id), start, end).await?;
        let anchor = self
            .store
            .latest_before(meter_id, start)
            .await?
            .map(|r| r.balance);

        let buckets = day_buckets(start_date, reference, &readings, anchor);
        Ok(StatisticsSeries {
            labels: buckets.iter().map(|b| civil::format_date(b.date)).collect(),
            balances: buckets.iter().map(|b| b.last_balance).collect(),
            usage: buckets.iter().map(|b| b.usage).collect(),
        })
    }

    /// Recharge-aware usage for one civil day, anchored across midnight on
    /// the latest reading before the day's start. A day without readings
    /// reports zero.
    pub async fn daily_usage(&self, meter_id: &str, date: Date) -> Result<f64, StoreError> {
        let start = civil::day_start(date);
        let end = civil::day_end(date);
        let readings = self.store.query_range(Some(meter_id), start, end).await?;
        if readings.is_empty() {
            return Ok(0.0);
        }
        let anchor = self
            .store
            .latest_before(meter_id, start)
            .await?
            .map(|r| r.balance);
        Ok(usage_with_recharge(
            readings.iter().map(|r| r.balance),
            anchor,
        ))
    }

    pub async fn kpi(
        &self,
        meter_id: &str,
        reference: Option<Date>,
    ) -> Result<KpiReport, StoreError> {
        let today = civil::now().date();
        let target = reference.unwrap_or(today);
        let key = format!("kpi:{meter_id}:{target}");
        if let Some(hit) = self.kpi_cache.get(&key) {
            return Ok(hit);
        }

        let yesterday = target - Duration::days(1);
        let day_before = target - Duration::days(2);

        let current_balance = self.store.latest(meter_id).await?.map(|r| r.balance);
        let target_date_last_balance = self
            .store
            .latest_on_date(meter_id, target)
            .await?
            .map(|r| r.balance);
        let yesterday_last_balance = self
            .store
            .latest_on_date(meter_id, yesterday)
            .await?
            .map(|r| r.balance);
        let day_before_yesterday_last_balance = self
            .store
            .latest_on_date(meter_id, day_before)
            .await?
            .map(|r| r.balance);

        let usage_target = self.daily_usage(meter_id, target).await?;
        let usage_yesterday = self.daily_usage(meter_id, yesterday).await?;

        // Same-day top-up estimate; stale reference dates never get one.
        let recharge_today = if target == today {
            match (current_balance, yesterday_last_balance) {
                (Some(current), Some(y_last)) => Some((current - y_last + usage_target).max(0.0)),
                _ => None,
            }
        } else {
            None
        };

        let report = KpiReport {
            current_balance,
            target_date_last_balance,
            yesterday_last_balance,
            day_before_yesterday_last_balance,
            usage_target,
            usage_yesterday,
            recharge_today,
        };
        self.kpi_cache.insert(key, report.clone());
        Ok(report)
    }

    /// Positive-drop usage totals for the current window and the window of
    /// equal length immediately before it. Deliberately coarser than the
    /// daily breakdown (no anchor, recharges simply ignored); the two are
    /// not reconciled at shared boundaries.
    pub async fn period_totals(
        &self,
        meter_id: &str,
        period: Period,
        reference: Option<Date>,
    ) -> Result<PeriodComparison, StoreError> {
        let now = civil::now();
        let today = now.date();
        let reference = reference.unwrap_or(today);

        let days = period.window_days();
        let start_cur = civil::day_start(reference - Duration::days(days - 1));
        let end_cur = if reference == today {
            now
        } else {
            civil::day_end(reference)
        };
        let start_prev = start_cur - Duration::days(days);

        let current_usage = self.window_drop_total(meter_id, start_cur, end_cur).await?;
        let previous_usage = self.window_drop_total(meter_id, start_prev, start_cur).await?;
        Ok(PeriodComparison {
            period,
            current_usage,
            previous_usage,
        })
    }

    async fn window_drop_total(
        &self,
        meter_id: &str,
        start: time::PrimitiveDateTime,
        end: time::PrimitiveDateTime,
    ) -> Result<f64, StoreError> {
        let readings = self.store.query_range(Some(meter_id), start, end).await?;
        Ok(monotonic_drop_total(readings.iter().map(|r| r.balance)))
    }

    /// Reconstructed recharge ledger over the trailing `query_days` window,
    /// newest first, truncated to `limit` after ordering.
    pub async fn recharge_history(
        &self,
        meter_id: &str,
        query_days: i64,
        limit: usize,
    ) -> Result<Vec<RechargeEvent>, StoreError> {
        let now = civil::now();
        let start = civil::day_start(now.date() - Duration::days(query_days));
        let readings = self.store.query_range(Some(meter_id), start, now).await?;
        Ok(ledger::reconstruct(&readings, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryReadingStore;
    use crate::domain::Reading;
    use time::macros::datetime;
    use time::PrimitiveDateTime;

    const NO_CACHE: std::time::Duration = std::time::Duration::ZERO;

    fn reading(ts: PrimitiveDateTime, balance: f64) -> Reading {
        Reading {
            ts,
            meter_id: "M1".to_string(),
            balance,
        }
    }

    fn aggregator(readings: Vec<Reading>) -> PeriodAggregator {
        let store = Arc::new(MemoryReadingStore::with_readings(readings));
        PeriodAggregator::new(store, NO_CACHE)
    }

    #[tokio::test]
    async fn day_series_without_anchor_seeds_hour_zero() {
        let agg = aggregator(vec![
            reading(datetime!(2024-03-05 00:10:00), 100.0),
            reading(datetime!(2024-03-05 00:50:00), 95.0),
            reading(datetime!(2024-03-05 01:30:00), 140.0),
            reading(datetime!(2024-03-05 02:10:00), 130.0),
        ]);
        let series = agg
            .statistics("M1", Period::Day, Some(time::macros::date!(2024-03-05)))
            .await
            .unwrap();

        assert_eq!(series.labels.len(), 24);
        assert_eq!(series.labels[0], "00");
        assert_eq!(series.labels[23], "23");
        assert_eq!(series.balances[0], Some(100.0)); // first of hour 0
        assert_eq!(series.balances[1], Some(140.0)); // last of hour 1
        assert_eq!(series.balances[2], Some(130.0));
        assert_eq!(series.balances[3], None);
        assert_eq!(series.usage[0], 0.0); // no anchor: first sample seeds
        assert_eq!(series.usage[1], 0.0); // recharge absorbed
        assert_eq!(series.usage[2], 10.0);
    }

    #[tokio::test]
    async fn day_series_with_cross_midnight_anchor_charges_hour_zero() {
        let agg = aggregator(vec![
            reading(datetime!(2024-03-04 23:40:00), 100.0),
            reading(datetime!(2024-03-05 00:10:00), 100.0),
            reading(datetime!(2024-03-05 00:50:00), 95.0),
            reading(datetime!(2024-03-05 01:30:00), 140.0),
            reading(datetime!(2024-03-05 02:10:00), 130.0),
        ]);
        let series = agg
            .statistics("M1", Period::Day, Some(time::macros::date!(2024-03-05)))
            .await
            .unwrap();
        assert_eq!(series.usage[0], 5.0);
        assert_eq!(series.usage[1], 0.0);
        assert_eq!(series.usage[2], 10.0);
    }

    #[tokio::test]
    async fn empty_store_still_yields_fully_shaped_series() {
        let agg = aggregator(Vec::new());
        for (period, len) in [(Period::Day, 24), (Period::Week, 7), (Period::Month, 30)] {
            let series = agg
                .statistics("M1", period, Some(time::macros::date!(2024-03-05)))
                .await
                .unwrap();
            assert_eq!(series.labels.len(), len);
            assert_eq!(series.balances.len(), len);
            assert_eq!(series.usage.len(), len);
            assert!(series.balances.iter().all(Option::is_none));
            assert!(series.usage.iter().all(|&u| u == 0.0));
        }
    }

    #[tokio::test]
    async fn week_series_labels_end_at_the_reference_date() {
        let agg = aggregator(vec![
            reading(datetime!(2024-03-03 08:00:00), 100.0),
            reading(datetime!(2024-03-03 20:00:00), 90.0),
            reading(datetime!(2024-03-05 12:00:00), 70.0),
        ]);
        let series = agg
            .statistics("M1", Period::Week, Some(time::macros::date!(2024-03-05)))
            .await
            .unwrap();
        assert_eq!(series.labels.len(), 7);
        assert_eq!(series.labels[0], "2024-02-28");
        assert_eq!(series.labels[6], "2024-03-05");
        assert_eq!(series.balances[4], Some(90.0)); // 03-03
        assert_eq!(series.usage[4], 10.0);
        assert_eq!(series.balances[5], None); // 03-04 has no readings
        assert_eq!(series.usage[5], 0.0);
        // 03-05 anchors on 03-03's close across the gap.
        assert_eq!(series.usage[6], 20.0);
    }

    #[tokio::test]
    async fn week_day_with_recharge_is_not_deflated() {
        let agg = aggregator(vec![
            reading(datetime!(2024-03-04 22:00:00), 25.0),
            reading(datetime!(2024-03-05 08:00:00), 20.0),
            reading(datetime!(2024-03-05 09:00:00), 70.0),
            reading(datetime!(2024-03-05 21:00:00), 60.0),
        ]);
        let series = agg
            .statistics("M1", Period::Week, Some(time::macros::date!(2024-03-05)))
            .await
            .unwrap();
        // 25 -> 20 uses 5, jump to 70 absorbed, 70 -> 60 uses 10.
        assert_eq!(series.usage[6], 15.0);
    }

    #[tokio::test]
    async fn aggregation_is_idempotent_over_fixed_data() {
        let agg = aggregator(vec![
            reading(datetime!(2024-03-05 00:10:00), 100.0),
            reading(datetime!(2024-03-05 06:00:00), 80.0),
            reading(datetime!(2024-03-05 07:30:00), 120.0),
        ]);
        let reference = Some(time::macros::date!(2024-03-05));
        let first = agg.statistics("M1", Period::Day, reference).await.unwrap();
        let second = agg.statistics("M1", Period::Day, reference).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn statistics_ignore_other_meters() {
        let agg = aggregator(vec![
            reading(datetime!(2024-03-05 01:00:00), 100.0),
            Reading {
                ts: datetime!(2024-03-05 02:00:00),
                meter_id: "M2".to_string(),
                balance: 5.0,
            },
        ]);
        let series = agg
            .statistics("M1", Period::Day, Some(time::macros::date!(2024-03-05)))
            .await
            .unwrap();
        assert_eq!(series.balances[2], None);
    }

    #[tokio::test]
    async fn kpi_recharge_estimate_matches_the_contract() {
        // current = 40, yesterday last = 10, usage today = 5
        // => recharge_today = max(40 - 10 + 5, 0) = 35.
        let today = civil::now().date();
        let yesterday = today - Duration::days(1);
        let agg = aggregator(vec![
            reading(PrimitiveDateTime::new(yesterday, time::macros::time!(23:00:00)), 10.0),
            reading(PrimitiveDateTime::new(today, time::macros::time!(00:30:00)), 8.0),
            reading(PrimitiveDateTime::new(today, time::macros::time!(01:00:00)), 5.0),
            reading(PrimitiveDateTime::new(today, time::macros::time!(01:30:00)), 40.0),
        ]);
        let report = agg.kpi("M1", None).await.unwrap();
        assert_eq!(report.current_balance, Some(40.0));
        assert_eq!(report.yesterday_last_balance, Some(10.0));
        assert_eq!(report.usage_target, 5.0);
        assert_eq!(report.recharge_today, Some(35.0));
    }

    #[tokio::test]
    async fn kpi_for_a_past_date_has_no_recharge_estimate() {
        let agg = aggregator(vec![
            reading(datetime!(2024-03-04 23:00:00), 50.0),
            reading(datetime!(2024-03-05 08:00:00), 45.0),
            reading(datetime!(2024-03-05 22:00:00), 40.0),
        ]);
        let report = agg
            .kpi("M1", Some(time::macros::date!(2024-03-05)))
            .await
            .unwrap();
        assert_eq!(report.target_date_last_balance, Some(40.0));
        assert_eq!(report.yesterday_last_balance, Some(50.0));
        assert_eq!(report.usage_target, 10.0);
        assert_eq!(report.recharge_today, None);
    }

    #[tokio::test]
    async fn kpi_with_no_data_is_all_absent_and_zero() {
        let agg = aggregator(Vec::new());
        let report = agg.kpi("M1", None).await.unwrap();
        assert_eq!(report.current_balance, None);
        assert_eq!(report.yesterday_last_balance, None);
        assert_eq!(report.usage_target, 0.0);
        assert_eq!(report.usage_yesterday, 0.0);
        assert_eq!(report.recharge_today, None);
    }

    #[tokio::test]
    async fn period_totals_compare_against_the_preceding_window() {
        let agg = aggregator(vec![
            // previous day: 100 -> 80, drop total 20
            reading(datetime!(2024-03-04 08:00:00), 100.0),
            reading(datetime!(2024-03-04 20:00:00), 80.0),
            // reference day: 78 -> 70 with a recharge jump ignored
            reading(datetime!(2024-03-05 08:00:00), 78.0),
            reading(datetime!(2024-03-05 10:00:00), 70.0),
            reading(datetime!(2024-03-05 11:00:00), 120.0),
            reading(datetime!(2024-03-05 20:00:00), 115.0),
        ]);
        let cmp = agg
            .period_totals("M1", Period::Day, Some(time::macros::date!(2024-03-05)))
            .await
            .unwrap();
        assert_eq!(cmp.period, Period::Day);
        assert_eq!(cmp.current_usage, 13.0); // 8 + 5, the rise ignored
        assert_eq!(cmp.previous_usage, 20.0);
        // The window edge is anchor-free: the 80 -> 78 overnight drop is
        // charged to neither window.
    }

    #[tokio::test]
    async fn recharge_history_runs_newest_first() {
        // Yesterday, so the whole sequence sits inside the trailing window
        // whatever the wall clock says.
        let day = civil::now().date() - Duration::days(1);
        let agg = aggregator(vec![
            reading(PrimitiveDateTime::new(day, time::macros::time!(00:10:00)), 95.0),
            reading(PrimitiveDateTime::new(day, time::macros::time!(01:30:00)), 140.0),
            reading(PrimitiveDateTime::new(day, time::macros::time!(02:10:00)), 130.0),
            reading(PrimitiveDateTime::new(day, time::macros::time!(09:00:00)), 180.0),
        ]);
        let events = agg.recharge_history("M1", 30, 50).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].amount, 50);
        assert_eq!(events[1].amount, 40);
        assert_eq!(events[1].balance_before, 95.0);
        assert_eq!(events[1].balance_after, 140.0);
    }

    #[test]
    fn period_parsing_matches_the_query_dispatch() {
        assert_eq!(Period::parse("day"), Period::Day);
        assert_eq!(Period::parse("week"), Period::Week);
        assert_eq!(Period::parse("month"), Period::Month);
        assert_eq!(Period::parse("quarter"), Period::Month);
    }
}
