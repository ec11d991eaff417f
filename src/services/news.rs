// src/services/news.rs

//! Regional news fetcher.
//!
//! Fetches the per-region news document from the versioned data endpoint.
//! Failures never propagate: after the retry budget is spent a region simply
//! has no posts this pass.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{PostRecord, Region, ScheduleConfig, SourceConfig};
use crate::services::extract::extract_posts;
use crate::services::version::VersionResolver;

/// Source of posts for a region.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Current posts for a region, in upstream order. Empty on failure.
    async fn fetch_posts(&self, region: &Region) -> Vec<PostRecord>;
}

/// Request counters, mostly useful for logging and tests.
#[derive(Debug, Default)]
pub struct FetchStats {
    requests: AtomicU32,
    token_refreshes: AtomicU32,
}

impl FetchStats {
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn token_refreshes(&self) -> u32 {
        self.token_refreshes.load(Ordering::Relaxed)
    }
}

/// HTTP news fetcher holding the cached version token.
pub struct NewsFetcher {
    client: reqwest::Client,
    resolver: VersionResolver,
    base_url: String,
    token: Mutex<Option<String>>,
    attempts: u32,
    retry_delay: Duration,
    stats: FetchStats,
}

impl NewsFetcher {
    pub fn new(client: reqwest::Client, source: &SourceConfig, schedule: &ScheduleConfig) -> Self {
        Self {
            resolver: VersionResolver::new(client.clone(), source),
            client,
            base_url: source.base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
            attempts: schedule.retry_attempts.max(1),
            retry_delay: Duration::from_millis(schedule.retry_delay_ms),
            stats: FetchStats::default(),
        }
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Cached token, if one has been resolved.
    pub async fn current_token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }

    /// Resolve a fresh token and cache it. Clears the cache on failure.
    pub async fn refresh_token(&self) -> Result<String> {
        let mut slot = self.token.lock().await;
        *slot = None;
        self.stats.token_refreshes.fetch_add(1, Ordering::Relaxed);

        let token = self.resolver.resolve().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Cached token, resolving one first if unset.
    async fn token(&self) -> Result<String> {
        if let Some(token) = self.current_token().await {
            return Ok(token);
        }
        self.refresh_token().await
    }

    /// Data endpoint for a region.
    pub fn news_url(&self, token: &str, region: &Region) -> String {
        format!("{}/_next/data/{}/{}/news.json", self.base_url, token, region)
    }

    async fn fetch_once(&self, region: &Region, token: &str) -> Result<Vec<PostRecord>> {
        let url = self.news_url(token, region);
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamStatus {
                url,
                status: status.as_u16(),
            });
        }

        let document: Value = response.json().await?;
        let posts = extract_posts(&document);
        log::debug!("{}: {} posts in document", region, posts.len());
        Ok(posts)
    }

    /// One retry with a fresh token after the upstream rotated it.
    async fn retry_with_new_token(&self, region: &Region) -> Vec<PostRecord> {
        let token = match self.refresh_token().await {
            Ok(token) => token,
            Err(e) => {
                log::warn!("{}: could not refresh version token: {}", region, e);
                return Vec::new();
            }
        };

        match self.fetch_once(region, &token).await {
            Ok(posts) => posts,
            Err(e) => {
                log::warn!("{}: fetch with refreshed token failed: {}", region, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl NewsSource for NewsFetcher {
    async fn fetch_posts(&self, region: &Region) -> Vec<PostRecord> {
        log::info!("Fetching news for {}", region);

        for attempt in 1..=self.attempts {
            let result = match self.token().await {
                Ok(token) => self.fetch_once(region, &token).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(posts) => return posts,
                Err(e) if attempt == 1 && e.is_not_found() => {
                    log::warn!("{}: data endpoint not found, version token is stale", region);
                    return self.retry_with_new_token(region).await;
                }
                Err(e) => {
                    log::warn!(
                        "{}: attempt {}/{} failed: {}",
                        region,
                        attempt,
                        self.attempts,
                        e
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        log::error!(
            "{}: giving up after {} attempts, no posts this pass",
            region,
            self.attempts
        );
        Vec::new()
    }
}
