// src/ingest/feed.rs
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

/// Fetches one page of the upstream feed as a raw body. Decoding happens in
/// the cycle driver so malformed payloads take the same path for every source.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<String>;
}

/// Production source: GET `service_url&page=<n>`.
pub struct HttpFeedSource {
    client: reqwest::Client,
    service_url: String,
}

impl HttpFeedSource {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            service_url: service_url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_page(&self, page: u32) -> Result<String> {
        let url = format!("{}&page={}", self.service_url, page);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetching feed page {page}"))?;
        resp.text()
            .await
            .with_context(|| format!("reading feed page {page} body"))
    }
}

/// What a scripted page serves.
pub enum ScriptedPage {
    Body(String),
    TransportError,
}

/// Test source: serves a fixed page sequence, then empty pages forever.
/// Lives here (not in tests/) so unit and integration tests share it.
pub struct ScriptedFeed {
    pages: Vec<ScriptedPage>,
    fetched: AtomicU32,
}

impl ScriptedFeed {
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self {
            pages,
            fetched: AtomicU32::new(0),
        }
    }

    pub fn from_bodies(bodies: Vec<String>) -> Self {
        Self::new(bodies.into_iter().map(ScriptedPage::Body).collect())
    }

    /// Number of page fetches issued so far (for test assertions).
    pub fn fetched(&self) -> u32 {
        self.fetched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_page(&self, page: u32) -> Result<String> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(page.saturating_sub(1) as usize) {
            Some(ScriptedPage::Body(body)) => Ok(body.clone()),
            Some(ScriptedPage::TransportError) => Err(anyhow!("connection refused")),
            None => Ok(r#"{"result":[]}"#.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_feed_runs_out_into_empty_pages() {
        let feed = ScriptedFeed::from_bodies(vec![r#"{"result":[]}"#.to_string()]);
        assert_eq!(feed.fetch_page(1).await.unwrap(), r#"{"result":[]}"#);
        assert_eq!(feed.fetch_page(2).await.unwrap(), r#"{"result":[]}"#);
        assert_eq!(feed.fetched(), 2);
    }

    #[tokio::test]
    async fn scripted_transport_error_surfaces_as_err() {
        let feed = ScriptedFeed::new(vec![ScriptedPage::TransportError]);
        assert!(feed.fetch_page(1).await.is_err());
    }
}
