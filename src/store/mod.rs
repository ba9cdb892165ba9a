// src/store/mod.rs
pub mod postgres;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use postgres::PgReportStore;

/// Report row ready for storage, post-normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub contribution_id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub text: String,
    pub url: String,
    pub photo_url: String,
    pub language: String,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Unique-key rejection: the report was already stored by an earlier
    /// cycle. This is the at-most-once guarantee, not an error.
    Duplicate,
}

/// Parameterized-statement surface the ingester needs from storage.
///
/// Implemented by `PgReportStore` (production) and `MemoryStore` (tests).
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Highest contribution id present in the reports table, `None` when empty.
    async fn max_contribution_id(&self) -> Result<Option<i64>>;
    async fn insert_report(&self, report: &NewReport) -> Result<InsertOutcome>;
    /// Record that the author behind `author_hash` has contributed once more.
    async fn upsert_author(&self, author_hash: &str) -> Result<()>;
}

/// In-memory store for tests. No database required; an outage can be
/// simulated with `set_unavailable`.
#[derive(Default)]
pub struct MemoryStore {
    reports: Mutex<Vec<NewReport>>,
    authors: Mutex<BTreeMap<String, u64>>,
    unavailable: AtomicBool,
    insert_attempts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored contribution ids in insertion order (for test assertions).
    pub fn report_ids(&self) -> Vec<i64> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.contribution_id)
            .collect()
    }

    pub fn reports(&self) -> Vec<NewReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn authors(&self) -> BTreeMap<String, u64> {
        self.authors.lock().unwrap().clone()
    }

    /// Number of `insert_report` calls, successful or not.
    pub fn insert_attempts(&self) -> u32 {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("storage unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn max_contribution_id(&self) -> Result<Option<i64>> {
        self.check_available()?;
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.contribution_id)
            .max())
    }

    async fn insert_report(&self, report: &NewReport) -> Result<InsertOutcome> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut reports = self.reports.lock().unwrap();
        if reports
            .iter()
            .any(|r| r.contribution_id == report.contribution_id)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        reports.push(report.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn upsert_author(&self, author_hash: &str) -> Result<()> {
        self.check_available()?;
        *self
            .authors
            .lock()
            .unwrap()
            .entry(author_hash.to_string())
            .or_insert(0) += 1;
        Ok(())
    }
}
