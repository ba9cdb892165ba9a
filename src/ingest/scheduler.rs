// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::ingest::DataSource;

/// Spawn the polling loop: one cycle immediately, then one every
/// `poll_interval_ms` until the returned handle is aborted.
///
/// Cycles run from this single task, so they serialize here; a cycle that
/// outruns the interval delays the next tick rather than overlapping it.
pub fn spawn_poller(source: Arc<DataSource>, poll_interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(poll_interval_ms.max(1)));
        loop {
            // The first tick completes immediately.
            ticker.tick().await;
            let summary = source.run_cycle().await;
            tracing::info!(
                target: "ingest",
                pages = summary.pages,
                accepted = summary.accepted,
                cursor = source.cursor(),
                "poll cycle finished"
            );
        }
    })
}
