// src/ingest/mod.rs
pub mod feed;
pub mod scheduler;
pub mod types;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::ingest::feed::FeedSource;
use crate::ingest::types::{FeedPage, Record};
use crate::persist::Persister;
use crate::store::ReportStore;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Completed poll cycles.");
        describe_counter!("ingest_pages_total", "Feed pages fetched and decoded.");
        describe_counter!(
            "ingest_accepted_total",
            "Records accepted by the filter (persisted or buffered)."
        );
        describe_counter!(
            "ingest_buffered_total",
            "Records diverted to the cache buffer."
        );
        describe_counter!("ingest_persisted_total", "Reports written to storage.");
        describe_counter!(
            "ingest_no_location_total",
            "Records dropped for the 0/0 geolocation sentinel."
        );
        describe_counter!(
            "ingest_feed_errors_total",
            "Transport-level page fetch failures."
        );
        describe_counter!(
            "ingest_decode_errors_total",
            "Pages that failed to decode as feed JSON."
        );
        describe_gauge!("ingest_cursor", "Highest fully processed contribution id.");
        describe_gauge!("ingest_buffer_len", "Records currently in the cache buffer.");
        describe_gauge!(
            "ingest_last_cycle_ts",
            "Unix ts when the last poll cycle finished."
        );
    });
}

/// Ingestion mode: `Live` persists accepted records immediately, `Buffering`
/// holds them in arrival order until cache mode is disabled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Live,
    Buffering,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestParams {
    /// Records whose update timestamp is older than this are never ingested.
    pub historical_load_period_ms: i64,
}

/// Mutable poller state. Single-writer in normal operation; mutex-confined so
/// an overlapping cycle cannot understate the high-water mark.
struct SourceState {
    cursor: i64,
    batch_high_water: i64,
    mode: CacheMode,
    buffer: VecDeque<Record>,
}

/// What one poll cycle did, for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    pub pages: u32,
    pub accepted: usize,
}

struct BatchVerdict {
    to_persist: Vec<Record>,
    accepted: usize,
    continue_paging: bool,
}

/// The feed data source: owns the progress cursor, drives pagination, filters
/// each batch, and routes accepted records to the persister or cache buffer.
pub struct DataSource {
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn ReportStore>,
    persister: Persister,
    params: IngestParams,
    state: Mutex<SourceState>,
}

impl DataSource {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn ReportStore>,
        params: IngestParams,
    ) -> Self {
        Self {
            feed,
            persister: Persister::new(store.clone()),
            store,
            params,
            state: Mutex::new(SourceState {
                cursor: 0,
                batch_high_water: 0,
                mode: CacheMode::Live,
                buffer: VecDeque::new(),
            }),
        }
    }

    /// Bootstrap the cursor from the highest stored contribution id. Storage
    /// being empty or unreachable is non-fatal: the cursor stays at 0 and the
    /// next cycles re-ingest the feed's retention window.
    pub async fn initialize(&self) {
        match self.store.max_contribution_id().await {
            Ok(Some(max)) => {
                let mut state = self.lock_state();
                state.cursor = max;
                state.batch_high_water = max;
                tracing::info!(cursor = max, "resuming after highest stored contribution");
            }
            Ok(None) => {
                tracing::info!("no stored reports, starting from the beginning of the feed");
            }
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    "could not read stored high-water mark, starting from 0"
                );
            }
        }
    }

    pub fn cursor(&self) -> i64 {
        self.lock_state().cursor
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.lock_state().mode
    }

    /// Records currently held in the cache buffer.
    pub fn buffered(&self) -> usize {
        self.lock_state().buffer.len()
    }

    /// Divert accepted records into the cache buffer instead of storage.
    /// Driven by an external storage-health signal, not by this core.
    pub fn enable_cache_mode(&self) {
        let mut state = self.lock_state();
        state.mode = CacheMode::Buffering;
        tracing::info!("cache mode enabled, buffering accepted records");
    }

    /// Return to live persistence, then replay everything buffered while cache
    /// mode was active, strictly in original arrival order. The buffer is
    /// snapshotted and cleared under the lock, so each record replays once.
    pub async fn disable_cache_mode(&self) {
        let drained: Vec<Record> = {
            let mut state = self.lock_state();
            state.mode = CacheMode::Live;
            state.buffer.drain(..).collect()
        };
        gauge!("ingest_buffer_len").set(0.0);
        tracing::info!(buffered = drained.len(), "cache mode disabled, replaying");
        for record in &drained {
            self.persister.persist(record).await;
        }
    }

    /// One complete poll-and-paginate run. Every termination path (feed
    /// exhausted, filter cutoff, transport or decode error) commits the cycle
    /// accumulator; errors never propagate to the caller.
    pub async fn run_cycle(&self) -> CycleSummary {
        ensure_metrics_described();
        self.begin_cycle();

        let mut summary = CycleSummary::default();
        let mut page: u32 = 1;
        loop {
            tracing::trace!(page, "loading feed page");
            let body = match self.feed.fetch_page(page).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(page, error = ?e, "page fetch failed, abandoning cycle");
                    counter!("ingest_feed_errors_total").increment(1);
                    break;
                }
            };
            let decoded = match serde_json::from_str::<FeedPage>(&body) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(page, error = %e, "malformed feed page, abandoning cycle");
                    counter!("ingest_decode_errors_total").increment(1);
                    break;
                }
            };
            summary.pages += 1;
            counter!("ingest_pages_total").increment(1);
            if decoded.result.is_empty() {
                tracing::debug!(page, "no results, end of feed");
                break;
            }

            let records: Vec<Record> = decoded.result.into_iter().map(Record::from).collect();
            let now_ms = chrono::Utc::now().timestamp_millis();
            let verdict = self.triage_batch(now_ms, records);
            summary.accepted += verdict.accepted;
            counter!("ingest_accepted_total").increment(verdict.accepted as u64);
            for record in &verdict.to_persist {
                self.persister.persist(record).await;
            }
            if !verdict.continue_paging {
                break;
            }
            page += 1;
        }

        self.commit_cycle();
        counter!("ingest_cycles_total").increment(1);
        gauge!("ingest_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);
        summary
    }

    /// Scan one ordered batch, stopping at the first already-seen or too-old
    /// record. Correct only while the feed delivers contribution ids in
    /// non-increasing recency order; a feed that interleaves old and new
    /// records would have the tail silently skipped.
    fn triage_batch(&self, now_ms: i64, records: Vec<Record>) -> BatchVerdict {
        let cutoff_ms = now_ms - self.params.historical_load_period_ms;
        let mut state = self.lock_state();

        let mut verdict = BatchVerdict {
            to_persist: Vec::new(),
            accepted: 0,
            continue_paging: true,
        };
        for record in records {
            if record.contribution_id <= state.cursor {
                tracing::debug!(
                    contribution_id = record.contribution_id,
                    "already processed, stopping batch"
                );
                verdict.continue_paging = false;
                break;
            }
            if record.update_ts * 1000 < cutoff_ms {
                tracing::debug!(
                    contribution_id = record.contribution_id,
                    update_ts = record.update_ts,
                    "older than historical load period, stopping batch"
                );
                verdict.continue_paging = false;
                break;
            }

            if state.batch_high_water < record.contribution_id {
                state.batch_high_water = record.contribution_id;
            }
            verdict.accepted += 1;
            match state.mode {
                CacheMode::Buffering => {
                    state.buffer.push_back(record);
                    counter!("ingest_buffered_total").increment(1);
                }
                CacheMode::Live => verdict.to_persist.push(record),
            }
        }
        gauge!("ingest_buffer_len").set(state.buffer.len() as f64);
        verdict
    }

    fn begin_cycle(&self) {
        let mut state = self.lock_state();
        state.batch_high_water = state.cursor;
    }

    /// Runs exactly once per cycle, whatever ended it. The cursor only ever
    /// moves forward, even when a later page of the same cycle failed.
    fn commit_cycle(&self) {
        let mut state = self.lock_state();
        if state.cursor < state.batch_high_water {
            state.cursor = state.batch_high_water;
        }
        gauge!("ingest_cursor").set(state.cursor as f64);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SourceState> {
        self.state.lock().expect("source state mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::feed::ScriptedFeed;
    use crate::store::MemoryStore;

    const NOW_MS: i64 = 1_700_000_000_000;
    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn source() -> DataSource {
        DataSource::new(
            Arc::new(ScriptedFeed::new(vec![])),
            Arc::new(MemoryStore::new()),
            IngestParams {
                historical_load_period_ms: HOUR_MS,
            },
        )
    }

    fn record(id: i64, update_ts: i64) -> Record {
        Record {
            contribution_id: id,
            update_ts,
            create_ts: update_ts - 60,
            title: String::new(),
            text: String::new(),
            url: String::new(),
            photo_url: None,
            longitude: 106.8,
            latitude: -6.2,
            author_id: "7".to_string(),
        }
    }

    fn fresh(id: i64) -> Record {
        record(id, NOW_MS / 1000)
    }

    #[test]
    fn already_seen_record_stops_the_batch() {
        let s = source();
        s.begin_cycle();
        let v = s.triage_batch(NOW_MS, vec![fresh(10)]);
        assert!(v.continue_paging);
        s.commit_cycle();
        assert_eq!(s.cursor(), 10);

        s.begin_cycle();
        let v = s.triage_batch(NOW_MS, vec![fresh(12), fresh(10), fresh(9)]);
        assert!(!v.continue_paging);
        let ids: Vec<i64> = v.to_persist.iter().map(|r| r.contribution_id).collect();
        assert_eq!(ids, vec![12]);
        s.commit_cycle();
        assert_eq!(s.cursor(), 12);
    }

    #[test]
    fn too_old_record_stops_the_batch() {
        let s = source();
        s.begin_cycle();
        let stale = record(3, (NOW_MS - 2 * HOUR_MS) / 1000);
        let v = s.triage_batch(NOW_MS, vec![fresh(5), fresh(4), stale]);
        assert!(!v.continue_paging);
        assert_eq!(v.accepted, 2);
        s.commit_cycle();
        assert_eq!(s.cursor(), 5);
    }

    #[test]
    fn cursor_survives_a_failed_later_page() {
        let s = source();
        s.begin_cycle();
        let v = s.triage_batch(NOW_MS, vec![fresh(8), fresh(7)]);
        assert!(v.continue_paging);
        // page 2 never arrives (transport error) -- commit still runs
        s.commit_cycle();
        assert_eq!(s.cursor(), 8);
    }

    #[test]
    fn buffering_diverts_accepted_records() {
        let s = source();
        s.enable_cache_mode();
        s.begin_cycle();
        let v = s.triage_batch(NOW_MS, vec![fresh(5), fresh(4)]);
        assert_eq!(v.accepted, 2);
        assert!(v.to_persist.is_empty());
        assert_eq!(s.buffered(), 2);
        assert_eq!(s.cache_mode(), CacheMode::Buffering);
    }
}
