//! Daily usage report: built from yesterday's readings and pushed once per
//! day at a configured civil time.

use std::sync::Arc;

use meter_client::domain::civil;
use meter_client::{PeriodAggregator, ReadingStore, StoreError};
use time::{Date, Duration, PrimitiveDateTime, Time};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::api::models::round2;
use crate::config::DeviceConfig;
use crate::notify::PushNotifier;

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub device_name: String,
    pub date: Date,
    pub usage: f64,
    /// Closing balance of the day before the reported day.
    pub balance_start: Option<f64>,
    /// Closing balance of the reported day.
    pub balance_end: Option<f64>,
}

/// Usage tier named in the report; thresholds carried over from the
/// long-standing notification template.
pub fn usage_tier(usage: f64) -> &'static str {
    if usage > 10.0 {
        "heavy"
    } else if usage > 5.0 {
        "normal"
    } else if usage > 0.0 {
        "light"
    } else {
        "idle"
    }
}

pub async fn build_yesterday_report(
    aggregator: &PeriodAggregator,
    store: &dyn ReadingStore,
    device: &DeviceConfig,
) -> Result<DailyReport, StoreError> {
    let yesterday = civil::now().date() - Duration::days(1);
    let day_before = yesterday - Duration::days(1);

    let usage = aggregator.daily_usage(&device.id, yesterday).await?;
    let balance_end = store
        .latest_on_date(&device.id, yesterday)
        .await?
        .map(|r| r.balance);
    let balance_start = store
        .latest_on_date(&device.id, day_before)
        .await?
        .map(|r| r.balance);

    Ok(DailyReport {
        device_name: device.name.clone(),
        date: yesterday,
        usage: round2(usage),
        balance_start,
        balance_end,
    })
}

/// Render the push title and markdown body for one report.
pub fn format_report(report: &DailyReport) -> (String, String) {
    let title = format!("Yesterday's usage: {} kWh", report.usage);

    let balance = |value: Option<f64>| match value {
        Some(v) => format!("{} kWh", round2(v)),
        None => "no data".to_string(),
    };

    let body = format!(
        "## Daily usage report\n\
         **Device:** {}\n\
         **Date:** {}\n\
         **Usage:** {} kWh ({})\n\
         **Opening balance:** {}\n\
         **Closing balance:** {}\n",
        report.device_name,
        civil::format_date(report.date),
        report.usage,
        usage_tier(report.usage),
        balance(report.balance_start),
        balance(report.balance_end),
    );

    (title, body)
}

/// Time left until the next civil `hour:minute`, never zero.
fn until_next(hour: u8, minute: u8) -> std::time::Duration {
    let now = civil::now();
    let target = Time::from_hms(hour.min(23), minute.min(59), 0)
        .expect("clamped time components are valid");
    let mut next = PrimitiveDateTime::new(now.date(), target);
    if next <= now {
        next += Duration::days(1);
    }
    let seconds = (next - now).whole_seconds().max(1);
    std::time::Duration::from_secs(seconds as u64)
}

/// Fire the daily report once per day at `hour:minute` civil time for every
/// device carrying a push key. Failures are logged per device and never stop
/// the loop.
pub fn spawn_daily_report(
    aggregator: Arc<PeriodAggregator>,
    store: Arc<dyn ReadingStore>,
    devices: Arc<Vec<DeviceConfig>>,
    notifier: Arc<PushNotifier>,
    hour: u8,
    minute: u8,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(hour, minute, "daily report scheduler started");

        loop {
            tokio::time::sleep(until_next(hour, minute)).await;

            for device in devices.iter() {
                let Some(key) = device.push_key.as_deref().filter(|k| !k.is_empty()) else {
                    debug!(device = %device.name, "no push key configured, skipping");
                    continue;
                };

                match build_yesterday_report(&aggregator, store.as_ref(), device).await {
                    Ok(report) => {
                        let (title, body) = format_report(&report);
                        match notifier.send(key, &title, &body).await {
                            Ok(()) => info!(device = %device.name, "daily report sent"),
                            Err(e) => {
                                error!(device = %device.name, error = %e, "failed to send daily report");
                            }
                        }
                    }
                    Err(e) => {
                        error!(device = %device.name, error = %e, "failed to build daily report");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_client::{MemoryReadingStore, Reading};
    use time::macros::{date, time};

    #[test]
    fn usage_tiers_follow_the_template_thresholds() {
        assert_eq!(usage_tier(12.0), "heavy");
        assert_eq!(usage_tier(10.0), "normal");
        assert_eq!(usage_tier(5.5), "normal");
        assert_eq!(usage_tier(5.0), "light");
        assert_eq!(usage_tier(0.1), "light");
        assert_eq!(usage_tier(0.0), "idle");
    }

    #[test]
    fn report_renders_absent_balances_as_no_data() {
        let (title, body) = format_report(&DailyReport {
            device_name: "dorm".to_string(),
            date: date!(2024-03-04),
            usage: 6.25,
            balance_start: None,
            balance_end: Some(31.5),
        });
        assert_eq!(title, "Yesterday's usage: 6.25 kWh");
        assert!(body.contains("**Device:** dorm"));
        assert!(body.contains("**Date:** 2024-03-04"));
        assert!(body.contains("(normal)"));
        assert!(body.contains("**Opening balance:** no data"));
        assert!(body.contains("**Closing balance:** 31.5 kWh"));
    }

    #[test]
    fn until_next_is_positive_and_within_a_day() {
        let wait = until_next(9, 0);
        assert!(wait > std::time::Duration::ZERO);
        assert!(wait <= std::time::Duration::from_secs(24 * 60 * 60));
    }

    #[tokio::test]
    async fn yesterday_report_uses_closing_balances_and_anchored_usage() {
        let today = civil::now().date();
        let yesterday = today - Duration::days(1);
        let day_before = yesterday - Duration::days(1);

        let store = Arc::new(MemoryReadingStore::with_readings(vec![
            Reading {
                ts: PrimitiveDateTime::new(day_before, time!(22:00:00)),
                meter_id: "M1".to_string(),
                balance: 50.0,
            },
            Reading {
                ts: PrimitiveDateTime::new(yesterday, time!(08:00:00)),
                meter_id: "M1".to_string(),
                balance: 44.0,
            },
            Reading {
                ts: PrimitiveDateTime::new(yesterday, time!(21:00:00)),
                meter_id: "M1".to_string(),
                balance: 41.5,
            },
        ]));
        let aggregator = Arc::new(PeriodAggregator::new(
            store.clone(),
            std::time::Duration::ZERO,
        ));
        let device = DeviceConfig {
            id: "M1".to_string(),
            name: "dorm".to_string(),
            push_key: None,
        };

        let report = build_yesterday_report(&aggregator, store.as_ref(), &device)
            .await
            .unwrap();
        assert_eq!(report.date, yesterday);
        assert_eq!(report.usage, 8.5); // 50 -> 44 -> 41.5, anchored across midnight
        assert_eq!(report.balance_start, Some(50.0));
        assert_eq!(report.balance_end, Some(41.5));
    }
}
