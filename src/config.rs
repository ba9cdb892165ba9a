// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const ENV_PATH: &str = "INGESTER_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/ingester.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct IngesterConfig {
    /// Feed base URL including the topic query; `&page=<n>` is appended.
    pub service_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Records older than this are never ingested.
    #[serde(default = "default_historical_load_period_ms")]
    pub historical_load_period_ms: i64,
    #[serde(default = "default_report_table")]
    pub report_table: String,
    #[serde(default = "default_author_table")]
    pub author_table: String,
    /// Usually supplied via $DATABASE_URL instead of the file.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_poll_interval_ms() -> u64 {
    1000 * 60 * 5
}

fn default_historical_load_period_ms() -> i64 {
    1000 * 60 * 60
}

fn default_report_table() -> String {
    "incident_reports".to_string()
}

fn default_author_table() -> String {
    "incident_authors".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl IngesterConfig {
    pub fn database_url(&self) -> Result<String> {
        self.database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .ok_or_else(|| anyhow!("set database_url in config or $DATABASE_URL"))
    }
}

pub fn load_from(path: &Path) -> Result<IngesterConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config from {}", path.display()))
}

/// Load config using env var + fallback:
/// 1) $INGESTER_CONFIG_PATH
/// 2) config/ingester.toml
pub fn load_default() -> Result<IngesterConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("INGESTER_CONFIG_PATH points to non-existent path"));
    }
    load_from(Path::new(DEFAULT_PATH))
}
