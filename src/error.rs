// src/error.rs

//! Unified error handling for the news watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Redis command or connection failed
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Version token could not be resolved
    #[error("Version token unavailable: {0}")]
    VersionToken(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned {status} for {url}")]
    UpstreamStatus { url: String, status: u16 },

    /// Chat platform rejected a message
    #[error("Delivery failed ({status}): {message}")]
    Delivery { status: u16, message: String },

    /// Destination channel or webhook does not exist
    #[error("Missing destination: {0}")]
    MissingDestination(String),

    /// Credentials rejected or send permission missing
    #[error("Permission denied: {0}")]
    Permission(String),

    /// State backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote state write rejected because the revision moved
    #[error("Stale revision: {0}")]
    StaleRevision(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a delivery error from a response status and body.
    pub fn delivery(status: u16, message: impl fmt::Display) -> Self {
        Self::Delivery {
            status,
            message: message.to_string(),
        }
    }

    /// Whether this is an upstream 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UpstreamStatus { status: 404, .. })
    }

    /// Errors that abort the whole pass instead of a single post.
    pub fn is_pass_fatal(&self) -> bool {
        matches!(self, Self::MissingDestination(_) | Self::Permission(_))
    }
}
