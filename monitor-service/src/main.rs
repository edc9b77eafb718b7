use std::{sync::Arc, time::Duration};

use anyhow::Result;
use meter_client::{PeriodAggregator, PgReadingStore, ReadingStore};
use monitor_service::{
    api,
    config::AppConfig,
    notify::PushNotifier,
    observability,
    pipeline::{Pipeline, Transform},
    report,
    sinks::StoreSink,
    sources::{MeterPollSource, MeterScraper},
    transform::ReadingValidation,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    let prometheus = match &cfg.metrics {
        Some(metrics) if metrics.enabled => Some(observability::init_metrics()),
        _ => None,
    };

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let store: Arc<dyn ReadingStore> = Arc::new(PgReadingStore::new(pool));
    let aggregator = Arc::new(PeriodAggregator::new(
        store.clone(),
        Duration::from_secs(cfg.cache.ttl_secs),
    ));
    let scraper = Arc::new(MeterScraper::new(&cfg.scrape)?);
    let notifier = Arc::new(PushNotifier::new(&cfg.report.push_api_base)?);
    let devices = Arc::new(cfg.devices.clone());

    // Scrape pipeline: poll every device on the configured interval,
    // validate, store.
    let source = MeterPollSource::new(
        scraper.clone(),
        cfg.devices.clone(),
        Duration::from_secs(cfg.scrape.interval_secs),
    );
    let sink = StoreSink::new(
        store.clone(),
        cfg.scrape.batch_size,
        cfg.scrape.max_retries,
        Duration::from_millis(cfg.scrape.retry_backoff_ms),
    );
    let transforms: Vec<Arc<dyn Transform<meter_client::Reading>>> =
        vec![Arc::new(ReadingValidation)];
    let pipeline = Pipeline {
        source,
        transforms,
        sink,
    };
    let _scrape_task = tokio::spawn(async move {
        if let Err(e) = pipeline.run().await {
            tracing::error!(error = %e, "scrape pipeline stopped");
        }
    });

    // Daily report push
    let _report_task = report::spawn_daily_report(
        aggregator.clone(),
        store.clone(),
        devices.clone(),
        notifier.clone(),
        cfg.report.hour,
        cfg.report.minute,
    );

    let state = api::AppState {
        aggregator,
        store,
        scraper,
        devices,
        notifier: Some(notifier),
        prometheus,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.http.bind_addr).await?;
    tracing::info!(
        addr = %cfg.http.bind_addr,
        devices = cfg.devices.len(),
        interval_secs = cfg.scrape.interval_secs,
        "meter monitor started"
    );
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
