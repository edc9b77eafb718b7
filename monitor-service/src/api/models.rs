//! JSON response shapes. These stay flat string-keyed records so the chart
//! frontend and the push tooling can consume them without any schema.

use meter_client::domain::civil;
use meter_client::{KpiReport, PeriodComparison, RechargeEvent, StatisticsSeries};
use serde::Serialize;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub labels: Vec<String>,
    pub balances: Vec<Option<f64>>,
    pub usage: Vec<f64>,
}

impl From<StatisticsSeries> for StatisticsResponse {
    fn from(series: StatisticsSeries) -> Self {
        Self {
            labels: series.labels,
            balances: series.balances,
            usage: series.usage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KpiResponse {
    pub current_balance: Option<f64>,
    pub target_date_last_balance: Option<f64>,
    pub yesterday_last_balance: Option<f64>,
    pub day_before_yesterday_last_balance: Option<f64>,
    pub usage_target: f64,
    pub usage_yesterday: f64,
    pub recharge_today: Option<f64>,
    /// Legacy alias of `usage_target`, kept for older dashboards.
    pub usage_today: f64,
}

impl From<KpiReport> for KpiResponse {
    fn from(report: KpiReport) -> Self {
        Self {
            current_balance: report.current_balance,
            target_date_last_balance: report.target_date_last_balance,
            yesterday_last_balance: report.yesterday_last_balance,
            day_before_yesterday_last_balance: report.day_before_yesterday_last_balance,
            usage_target: report.usage_target,
            usage_yesterday: report.usage_yesterday,
            recharge_today: report.recharge_today,
            usage_today: report.usage_target,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PeriodKpiResponse {
    pub period: &'static str,
    pub current_usage: f64,
    pub previous_usage: f64,
}

impl From<PeriodComparison> for PeriodKpiResponse {
    fn from(cmp: PeriodComparison) -> Self {
        Self {
            period: cmp.period.as_str(),
            current_usage: cmp.current_usage,
            previous_usage: cmp.previous_usage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RechargeRecord {
    pub recharge_time: String,
    pub recharge_date: String,
    pub recharge_amount: i64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub device_id: String,
}

impl From<RechargeEvent> for RechargeRecord {
    fn from(event: RechargeEvent) -> Self {
        Self {
            recharge_time: civil::format_datetime(event.ts),
            recharge_date: civil::format_date(event.ts.date()),
            recharge_amount: event.amount,
            balance_before: round2(event.balance_before),
            balance_after: round2(event.balance_after),
            device_id: event.meter_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RechargeHistoryResponse {
    pub recharges: Vec<RechargeRecord>,
    pub total_count: usize,
    pub query_days: i64,
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationTestResponse {
    pub success: bool,
    pub message: String,
    pub device_name: String,
}
