use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use meter_client::domain::civil;
use meter_client::Period;
use time::Date;

use super::models::{
    FetchResponse, KpiResponse, NotificationTestResponse, PeriodKpiResponse,
    RechargeHistoryResponse, RechargeRecord, StatisticsResponse,
};
use super::AppState;
use crate::report;

const DEFAULT_QUERY_DAYS: i64 = 30;
const DEFAULT_QUERY_LIMIT: usize = 50;

/// Device named in the query, or the first configured device. An empty id
/// (nothing configured at all) still aggregates: it just matches no
/// readings, so the response keeps its full shape with absent balances.
fn resolve_device(state: &AppState, params: &HashMap<String, String>) -> String {
    params
        .get("device_id")
        .cloned()
        .or_else(|| state.devices.first().map(|d| d.id.clone()))
        .unwrap_or_default()
}

/// Malformed dates silently fall back to today; requests are never rejected
/// over the reference date.
fn resolve_date(params: &HashMap<String, String>) -> Option<Date> {
    params.get("date").and_then(|s| civil::parse_date(s))
}

fn resolve_period(params: &HashMap<String, String>) -> Period {
    Period::parse(params.get("period").map(String::as_str).unwrap_or("day"))
}

pub async fn statistics(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<StatisticsResponse>, StatusCode> {
    let device = resolve_device(&state, &params);
    let series = state
        .aggregator
        .statistics(&device, resolve_period(&params), resolve_date(&params))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "statistics query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(series.into()))
}

pub async fn kpi(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<KpiResponse>, StatusCode> {
    let device = resolve_device(&state, &params);
    let report = state
        .aggregator
        .kpi(&device, resolve_date(&params))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "kpi query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(report.into()))
}

pub async fn period_kpi(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PeriodKpiResponse>, StatusCode> {
    let device = resolve_device(&state, &params);
    let comparison = state
        .aggregator
        .period_totals(&device, resolve_period(&params), None)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "period comparison query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(comparison.into()))
}

pub async fn recharge_history(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<RechargeHistoryResponse>, StatusCode> {
    let device = resolve_device(&state, &params);
    let query_days = params
        .get("days")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_QUERY_DAYS);
    let limit = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_QUERY_LIMIT);

    let events = state
        .aggregator
        .recharge_history(&device, query_days, limit)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "recharge history query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let recharges: Vec<RechargeRecord> = events.into_iter().map(Into::into).collect();
    Ok(Json(RechargeHistoryResponse {
        total_count: recharges.len(),
        recharges,
        query_days,
        device_id: device,
    }))
}

/// Scrape the device right now and store the reading. Scrape failures are
/// reported in the message, not as an HTTP error; only a store failure is.
pub async fn fetch_now(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<FetchResponse>, StatusCode> {
    let device = resolve_device(&state, &params);
    if device.is_empty() {
        return Ok(Json(FetchResponse {
            message: "fetch failed: no device configured".to_string(),
        }));
    }

    match state.scraper.fetch(&device).await {
        Ok(reading) => {
            state.store.insert(&reading).await.map_err(|e| {
                tracing::error!(error = %e, "failed to store fetched reading");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            Ok(Json(FetchResponse {
                message: format!(
                    "fetched meter {}: balance {} at {}",
                    reading.meter_id,
                    reading.balance,
                    civil::format_datetime(reading.ts)
                ),
            }))
        }
        Err(e) => {
            tracing::warn!(device_id = %device, error = %e, "manual fetch failed");
            Ok(Json(FetchResponse {
                message: format!("fetch failed: {e}"),
            }))
        }
    }
}

/// Send yesterday's report through the push channel right now.
pub async fn test_notification(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<NotificationTestResponse>, StatusCode> {
    let device = match params.get("device_id") {
        Some(id) => state.devices.iter().find(|d| &d.id == id),
        None => state.devices.first(),
    };
    let Some(device) = device else {
        return Ok(Json(NotificationTestResponse {
            success: false,
            message: "device not found".to_string(),
            device_name: String::new(),
        }));
    };

    let Some(key) = device.push_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(Json(NotificationTestResponse {
            success: false,
            message: "push key not configured".to_string(),
            device_name: device.name.clone(),
        }));
    };
    let Some(notifier) = state.notifier.as_ref() else {
        return Ok(Json(NotificationTestResponse {
            success: false,
            message: "push channel not configured".to_string(),
            device_name: device.name.clone(),
        }));
    };

    let daily = report::build_yesterday_report(&state.aggregator, state.store.as_ref(), device)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to build test report");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let (title, body) = report::format_report(&daily);

    match notifier.send(key, &format!("[test] {title}"), &body).await {
        Ok(()) => Ok(Json(NotificationTestResponse {
            success: true,
            message: "sent".to_string(),
            device_name: device.name.clone(),
        })),
        Err(e) => Ok(Json(NotificationTestResponse {
            success: false,
            message: e.to_string(),
            device_name: device.name.clone(),
        })),
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}
