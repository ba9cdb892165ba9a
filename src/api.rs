// src/api.rs
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::ingest::{CacheMode, DataSource};

#[derive(Clone)]
pub struct AppState {
    source: Arc<DataSource>,
}

/// Ops router: liveness plus the cache-mode switch an external storage-health
/// watchdog drives. Merge `metrics::router()` on top for /metrics.
pub fn create_router(source: Arc<DataSource>) -> Router {
    let state = AppState { source };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/admin/status", get(status))
        .route("/admin/cache-mode/enable", post(enable_cache_mode))
        .route("/admin/cache-mode/disable", post(disable_cache_mode))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct StatusResp {
    cursor: i64,
    cache_mode: &'static str,
    buffered: usize,
}

fn status_of(source: &DataSource) -> Json<StatusResp> {
    Json(StatusResp {
        cursor: source.cursor(),
        cache_mode: match source.cache_mode() {
            CacheMode::Live => "live",
            CacheMode::Buffering => "buffering",
        },
        buffered: source.buffered(),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResp> {
    status_of(&state.source)
}

async fn enable_cache_mode(State(state): State<AppState>) -> Json<StatusResp> {
    state.source.enable_cache_mode();
    status_of(&state.source)
}

async fn disable_cache_mode(State(state): State<AppState>) -> Json<StatusResp> {
    state.source.disable_cache_mode().await;
    status_of(&state.source)
}
