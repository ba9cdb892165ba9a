// src/store/postgres.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use sqlx::postgres::PgPool;

use super::{InsertOutcome, NewReport, ReportStore};

/// Postgres-backed report store. Table names come from configuration and are
/// interpolated into statement text, so they must be plain identifiers; all
/// values go through bind parameters.
pub struct PgReportStore {
    pool: PgPool,
    report_table: String,
    author_table: String,
}

fn is_plain_identifier(name: &str) -> bool {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    re.is_match(name)
}

impl PgReportStore {
    pub fn new(pool: PgPool, report_table: &str, author_table: &str) -> Result<Self> {
        for name in [report_table, author_table] {
            if !is_plain_identifier(name) {
                bail!("invalid table name in config: {name:?}");
            }
        }
        Ok(Self {
            pool,
            report_table: report_table.to_string(),
            author_table: author_table.to_string(),
        })
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn max_contribution_id(&self) -> Result<Option<i64>> {
        let sql = format!("SELECT MAX(contribution_id) FROM {}", self.report_table);
        let max: Option<i64> = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .context("querying stored high-water mark")?;
        Ok(max)
    }

    async fn insert_report(&self, report: &NewReport) -> Result<InsertOutcome> {
        let sql = format!(
            "INSERT INTO {} \
             (contribution_id, created_at, title, text, lang, url, image_url, the_geom) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, ST_SetSRID(ST_MakePoint($8, $9), 4326))",
            self.report_table
        );
        match sqlx::query(&sql)
            .bind(report.contribution_id)
            .bind(report.created_at)
            .bind(&report.title)
            .bind(&report.text)
            .bind(&report.language)
            .bind(&report.url)
            .bind(&report.photo_url)
            .bind(report.longitude)
            .bind(report.latitude)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e).context("inserting report"),
        }
    }

    async fn upsert_author(&self, author_hash: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {t} (author_hash, reports_count) VALUES ($1, 1) \
             ON CONFLICT (author_hash) DO UPDATE \
             SET reports_count = {t}.reports_count + 1",
            t = self.author_table
        );
        sqlx::query(&sql)
            .bind(author_hash)
            .execute(&self.pool)
            .await
            .context("upserting author aggregate")?;
        Ok(())
    }
}
