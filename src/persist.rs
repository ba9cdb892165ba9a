// src/persist.rs
//! Writes one accepted record to storage: geolocation gate, outgoing field
//! normalization, report insert, then the per-author aggregate upsert.

use std::sync::Arc;

use chrono::DateTime;
use metrics::counter;
use sha2::{Digest, Sha256};

use crate::ingest::types::Record;
use crate::store::{InsertOutcome, NewReport, ReportStore};

/// Stand-in stored when the feed delivered no photo.
pub const MISSING_PHOTO: &str = "none present";

/// The feed serves a single locale; upstream language tags are unreliable.
pub const FEED_LANGUAGE: &str = "id";

pub struct Persister {
    store: Arc<dyn ReportStore>,
}

impl Persister {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Persist one record. Never fails the cycle: records without usable
    /// geolocation are dropped silently, duplicates are absorbed by the
    /// store's unique key, and write failures are logged and dropped.
    pub async fn persist(&self, record: &Record) {
        if record.longitude == 0.0 && record.latitude == 0.0 {
            tracing::debug!(
                contribution_id = record.contribution_id,
                "no usable geolocation, dropping"
            );
            counter!("ingest_no_location_total").increment(1);
            return;
        }

        let report = normalize(record);
        match self.store.insert_report(&report).await {
            Ok(InsertOutcome::Inserted) => {
                counter!("ingest_persisted_total").increment(1);
                // The author write only runs after the report write succeeded;
                // the two are not transactional.
                let hash = author_hash(&record.author_id);
                if let Err(e) = self.store.upsert_author(&hash).await {
                    tracing::warn!(
                        contribution_id = record.contribution_id,
                        error = ?e,
                        "author aggregate upsert failed"
                    );
                }
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::debug!(
                    contribution_id = record.contribution_id,
                    "report already stored, skipping"
                );
            }
            Err(e) => {
                tracing::warn!(
                    contribution_id = record.contribution_id,
                    error = ?e,
                    "report insert failed, dropping record"
                );
            }
        }
    }
}

/// Shape a record for storage: strip spurious escape characters from URLs,
/// default a missing photo, and pin the language tag.
pub fn normalize(record: &Record) -> NewReport {
    let photo_url = record
        .photo_url
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(strip_escapes)
        .unwrap_or_else(|| MISSING_PHOTO.to_string());

    NewReport {
        contribution_id: record.contribution_id,
        created_at: DateTime::from_timestamp(record.create_ts, 0).unwrap_or(DateTime::UNIX_EPOCH),
        title: record.title.clone(),
        text: record.text.clone(),
        url: strip_escapes(&record.url),
        photo_url,
        language: FEED_LANGUAGE.to_string(),
        longitude: record.longitude,
        latitude: record.latitude,
    }
}

/// The feed double-escapes URL fields (`https:\/\/...`); drop the backslashes.
pub fn strip_escapes(s: &str) -> String {
    s.replace('\\', "")
}

/// One-way key for the author aggregate; the raw upstream id is never stored.
pub fn author_hash(author_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(author_id.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn record(id: i64) -> Record {
        Record {
            contribution_id: id,
            update_ts: 1_700_000_100,
            create_ts: 1_700_000_000,
            title: "Flooding".into(),
            text: "Water rising".into(),
            url: r"https:\/\/example.com\/report\/42".into(),
            photo_url: None,
            longitude: 106.8,
            latitude: -6.2,
            author_id: "7".into(),
        }
    }

    #[test]
    fn urls_lose_their_escapes() {
        assert_eq!(
            strip_escapes(r"https:\/\/example.com\/a"),
            "https://example.com/a"
        );
        assert_eq!(strip_escapes("https://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn normalize_defaults_photo_and_pins_language() {
        let report = normalize(&record(42));
        assert_eq!(report.url, "https://example.com/report/42");
        assert_eq!(report.photo_url, MISSING_PHOTO);
        assert_eq!(report.language, FEED_LANGUAGE);
        assert_eq!(report.created_at.timestamp(), 1_700_000_000);

        let mut with_photo = record(42);
        with_photo.photo_url = Some(r"https:\/\/example.com\/p.jpg".into());
        assert_eq!(normalize(&with_photo).photo_url, "https://example.com/p.jpg");
    }

    #[test]
    fn author_hash_is_stable_and_opaque() {
        assert_eq!(author_hash("7"), author_hash("7"));
        assert_ne!(author_hash("7"), author_hash("8"));
        assert_eq!(author_hash("7").len(), 64);
    }

    #[tokio::test]
    async fn zero_zero_location_is_never_written() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());
        let mut r = record(1);
        r.longitude = 0.0;
        r.latitude = 0.0;
        persister.persist(&r).await;
        assert!(store.report_ids().is_empty());
        assert_eq!(store.insert_attempts(), 0);
    }

    #[tokio::test]
    async fn author_write_runs_only_after_report_insert_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());

        store.set_unavailable(true);
        persister.persist(&record(1)).await;
        assert!(store.authors().is_empty());

        store.set_unavailable(false);
        persister.persist(&record(1)).await;
        assert_eq!(store.report_ids(), vec![1]);
        assert_eq!(store.authors().len(), 1);

        // duplicate delivery: no second author increment
        persister.persist(&record(1)).await;
        assert_eq!(store.report_ids(), vec![1]);
        assert_eq!(store.authors().values().sum::<u64>(), 1);
    }
}
