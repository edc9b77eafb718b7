pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use meter_client::{PeriodAggregator, ReadingStore};

use crate::config::DeviceConfig;
use crate::notify::PushNotifier;
use crate::sources::MeterScraper;

/// Everything a request handler can reach. Built once in `main` from the
/// loaded configuration; handlers never touch ambient state.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<PeriodAggregator>,
    pub store: Arc<dyn ReadingStore>,
    pub scraper: Arc<MeterScraper>,
    pub devices: Arc<Vec<DeviceConfig>>,
    pub notifier: Option<Arc<PushNotifier>>,
    pub prometheus: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/data", get(handlers::statistics))
        .route("/kpi", get(handlers::kpi))
        .route("/period_kpi", get(handlers::period_kpi))
        .route("/recharge_history", get(handlers::recharge_history))
        .route("/fetch", get(handlers::fetch_now))
        .route("/test_notification", get(handlers::test_notification))
        .route("/healthz", get(handlers::healthz));

    if state.prometheus.is_some() {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router.with_state(state)
}
