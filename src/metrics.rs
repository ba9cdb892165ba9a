// src/metrics.rs
use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Call once at startup, before the first
/// cycle runs, so every ingest series is registered from the beginning.
pub fn install(poll_interval_ms: u64) -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus: install recorder");

    // Static gauge so dashboards can relate cycle counts to wall time.
    gauge!("ingest_poll_interval_ms").set(poll_interval_ms as f64);

    handle
}

/// Router exposing `/metrics` in the Prometheus exposition format.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}
