// tests/poller_smoke.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use incident_feed_ingester::{
    spawn_poller, DataSource, IngestParams, MemoryStore, ScriptedFeed, ScriptedPage,
};

fn one_record_page() -> ScriptedPage {
    let now = Utc::now().timestamp();
    ScriptedPage::Body(
        serde_json::json!({
            "result": [{
                "contributionId": 5,
                "title": "Report 5",
                "text": "Bridge under water",
                "url": "https://example.com/report/5",
                "date": { "update": { "sec": now }, "create": { "sec": now - 60 } },
                "location": { "geospatial": { "longitude": 106.8, "latitude": -6.2 } },
                "files": {},
                "user": { "creator": { "id": 5 } }
            }]
        })
        .to_string(),
    )
}

fn build(store: Arc<MemoryStore>) -> (Arc<DataSource>, Arc<ScriptedFeed>) {
    let feed = Arc::new(ScriptedFeed::new(vec![one_record_page()]));
    let source = Arc::new(DataSource::new(
        feed.clone(),
        store,
        IngestParams {
            historical_load_period_ms: 60 * 60 * 1000,
        },
    ));
    (source, feed)
}

#[tokio::test(start_paused = true)]
async fn poll_runs_immediately_at_start() {
    let store = Arc::new(MemoryStore::new());
    let (source, _feed) = build(store.clone());

    let handle = spawn_poller(source.clone(), 60_000);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(store.report_ids(), vec![5]);
    assert_eq!(source.cursor(), 5);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn later_cycles_fire_on_the_interval() {
    let store = Arc::new(MemoryStore::new());
    let (source, feed) = build(store.clone());

    let handle = spawn_poller(source.clone(), 60_000);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let after_first = feed.fetched();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(feed.fetched() > after_first);
    // the repeat cycle found nothing new
    assert_eq!(store.report_ids(), vec![5]);
    handle.abort();
}
