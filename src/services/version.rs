// src/services/version.rs

//! Version token resolver.
//!
//! The news data endpoint embeds a build identifier in its path. The site
//! rotates it on every deploy, so it is scraped from the public news page
//! and treated as a cache that can go stale.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::SourceConfig;
use crate::utils::join_path;

/// Text pattern carrying the token inside the page.
const BUILD_ID_PATTERN: &str = r#""buildId"\s*:\s*"([^"]+)""#;

static BUILD_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(BUILD_ID_PATTERN).ok());

/// Resolves the current version token from the news page.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    client: reqwest::Client,
    page_url: String,
}

impl VersionResolver {
    pub fn new(client: reqwest::Client, config: &SourceConfig) -> Self {
        Self {
            client,
            page_url: join_path(&config.base_url, &config.news_page),
        }
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    /// Fetch the news page and extract the token. No retries.
    pub async fn resolve(&self) -> Result<String> {
        let response = self.client.get(&self.page_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::VersionToken(format!(
                "{} returned {}",
                self.page_url, status
            )));
        }

        let html = response.text().await?;
        let token = extract_build_id(&html).ok_or_else(|| {
            AppError::VersionToken(format!("no buildId found in {}", self.page_url))
        })?;

        log::info!("Resolved version token {}", token);
        Ok(token)
    }
}

/// Extract the build id from a news page.
///
/// Reads the `__NEXT_DATA__` payload when the page has one, and falls back
/// to a text match over the whole document.
pub fn extract_build_id(html: &str) -> Option<String> {
    from_next_data(html).or_else(|| from_pattern(html))
}

fn from_next_data(html: &str) -> Option<String> {
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    let document = Html::parse_document(html);
    let script: String = document.select(&selector).next()?.text().collect();
    let data: serde_json::Value = serde_json::from_str(&script).ok()?;
    data.get("buildId")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn from_pattern(html: &str) -> Option<String> {
    BUILD_ID
        .as_ref()?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
