// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::SourceConfig;

/// User-Agent for calls to the Discord and GitHub APIs.
pub const API_USER_AGENT: &str = concat!("newswatch/", env!("CARGO_PKG_VERSION"));

/// Create a client that looks like a desktop browser to the news site.
///
/// The publisher rejects bare requests, so every call carries the same
/// headers a browser would send when navigating from the site root.
pub fn create_async_client(config: &SourceConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    let referer = format!("{}/", config.base_url.trim_end_matches('/'));
    headers.insert(
        header::REFERER,
        HeaderValue::from_str(&referer)
            .map_err(|e| AppError::config(format!("invalid base_url for Referer: {e}")))?,
    );

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Create a client for JSON APIs (Discord, GitHub).
pub fn create_api_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(API_USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}
