//! Incident Feed Ingester — Binary Entrypoint
//! Boots the polling loop against the configured feed plus the ops HTTP
//! surface (health, admin cache-mode toggles, Prometheus metrics).

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use incident_feed_ingester::ingest::feed::HttpFeedSource;
use incident_feed_ingester::ingest::{scheduler, DataSource, IngestParams};
use incident_feed_ingester::store::PgReportStore;
use incident_feed_ingester::{api, config, metrics};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("incident_feed_ingester=info,ingest=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = config::load_default()?;
    let database_url = cfg.database_url()?;

    // Lazy pool: a storage outage at boot must not stop polling. The cursor
    // bootstrap degrades to 0 and cache mode can bridge the gap.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&database_url)
        .context("building postgres pool")?;
    let store = Arc::new(PgReportStore::new(pool, &cfg.report_table, &cfg.author_table)?);

    let feed = Arc::new(HttpFeedSource::new(cfg.service_url.clone()));
    let source = Arc::new(DataSource::new(
        feed,
        store,
        IngestParams {
            historical_load_period_ms: cfg.historical_load_period_ms,
        },
    ));
    source.initialize().await;

    let prometheus = metrics::install(cfg.poll_interval_ms);
    let poller = scheduler::spawn_poller(source.clone(), cfg.poll_interval_ms);
    tracing::info!(
        service_url = %cfg.service_url,
        poll_interval_ms = cfg.poll_interval_ms,
        "poller started"
    );

    let app = api::create_router(source).merge(metrics::router(prometheus));
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "ops server listening");
    axum::serve(listener, app).await?;

    poller.abort();
    Ok(())
}
