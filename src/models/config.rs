//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::region::{Region, parse_regions};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream news source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Polling cadence, pacing and retry settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Notification destination
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Seen-state backend
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply overrides from process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            self.discord.webhook_url = Some(url);
        }
        if let Some(id) = get("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = Some(id);
        }
        if let Some(secs) = get("CHECK_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.schedule.interval_secs = secs;
        }
        if let Some(secs) = get("HEARTBEAT_SECS").and_then(|v| v.parse().ok()) {
            self.schedule.heartbeat_secs = secs;
        }
        if let Some(backend) = get("STATE_BACKEND") {
            match backend.parse() {
                Ok(backend) => self.storage.backend = backend,
                Err(e) => log::warn!("Ignoring STATE_BACKEND: {}", e),
            }
        }
        if let Some(path) = get("STATE_FILE") {
            self.storage.file_path = path;
        }
        if let Some(repo) = get("GITHUB_REPO") {
            self.storage.github_repo = Some(repo);
        }
        if let Some(branch) = get("GITHUB_BRANCH") {
            self.storage.github_branch = branch;
        }
        if let Some(path) = get("GITHUB_PATH") {
            self.storage.github_path = path;
        }
        if let Some(bucket) = get("S3_BUCKET") {
            self.storage.s3_bucket = Some(bucket);
        }
        if let Some(key) = get("S3_KEY") {
            self.storage.s3_key = key;
        }
    }

    /// Parsed and normalized region list.
    pub fn regions(&self) -> Result<Vec<Region>> {
        parse_regions(&self.source.regions)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        url::Url::parse(&self.source.base_url)
            .map_err(|e| AppError::validation(format!("source.base_url is invalid: {e}")))?;
        if self.regions()?.is_empty() {
            return Err(AppError::validation("No regions defined"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.schedule.interval_secs == 0 {
            return Err(AppError::validation("schedule.interval_secs must be > 0"));
        }
        if self.schedule.retry_attempts == 0 {
            return Err(AppError::validation("schedule.retry_attempts must be > 0"));
        }
        if self.discord.webhook_url.is_none() && self.discord.channel_id.is_none() {
            return Err(AppError::validation(
                "discord.webhook_url or discord.channel_id must be set",
            ));
        }

        match self.storage.backend {
            StorageBackend::File | StorageBackend::Redis => {}
            StorageBackend::Github => {
                let repo = self.storage.github_repo.as_deref().unwrap_or_default();
                if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
                    return Err(AppError::validation(
                        "storage.github_repo must look like 'owner/name'",
                    ));
                }
            }
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(AppError::validation("storage.s3_bucket is required"));
                }
            }
        }
        Ok(())
    }
}

/// Upstream news source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Publisher origin, also used to resolve relative post links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Page carrying the version token, relative to `base_url`
    #[serde(default = "defaults::news_page")]
    pub news_page: String,

    /// User-Agent header for upstream requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Region codes to poll, in order
    #[serde(default = "defaults::regions")]
    pub regions: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            news_page: defaults::news_page(),
            user_agent: defaults::user_agent(),
            regions: defaults::regions(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Polling cadence, pacing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between check passes
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Pause after each region in milliseconds
    #[serde(default = "defaults::region_delay")]
    pub region_delay_ms: u64,

    /// Fetch attempts per region
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between fetch attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Seconds between heartbeat messages, 0 disables them
    #[serde(default = "defaults::heartbeat")]
    pub heartbeat_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            region_delay_ms: defaults::region_delay(),
            retry_attempts: defaults::retry_attempts(),
            retry_delay_ms: defaults::retry_delay(),
            heartbeat_secs: defaults::heartbeat(),
        }
    }
}

/// Discord destination settings. The bot token is read from `DISCORD_TOKEN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Incoming webhook URL; takes precedence over `channel_id`
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Channel to post into with a bot token
    #[serde(default)]
    pub channel_id: Option<String>,

    /// REST API base
    #[serde(default = "defaults::discord_api")]
    pub api_base: String,

    /// Display name override for webhook posts
    #[serde(default)]
    pub username: Option<String>,

    /// Embed footer text
    #[serde(default = "defaults::footer")]
    pub footer: String,

    /// Embed accent color
    #[serde(default = "defaults::color")]
    pub color: u32,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            channel_id: None,
            api_base: defaults::discord_api(),
            username: None,
            footer: defaults::footer(),
            color: defaults::color(),
        }
    }
}

/// Which seen-state backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Redis,
    Github,
    S3,
}

impl std::str::FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "redis" => Ok(Self::Redis),
            "github" => Ok(Self::Github),
            "s3" => Ok(Self::S3),
            other => Err(AppError::config(format!("unknown state backend '{other}'"))),
        }
    }
}

/// Seen-state backend settings. Credentials come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// JSON file for the `file` backend
    #[serde(default = "defaults::state_file")]
    pub file_path: String,

    /// Key holding the document for the `redis` backend
    #[serde(default = "defaults::redis_key")]
    pub redis_key: String,

    /// `owner/name` of the repository for the `github` backend
    #[serde(default)]
    pub github_repo: Option<String>,

    /// File path inside the repository
    #[serde(default = "defaults::state_file")]
    pub github_path: String,

    #[serde(default = "defaults::github_branch")]
    pub github_branch: String,

    #[serde(default = "defaults::github_api")]
    pub github_api: String,

    /// Bucket for the `s3` backend
    #[serde(default)]
    pub s3_bucket: Option<String>,

    #[serde(default = "defaults::state_file")]
    pub s3_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            file_path: defaults::state_file(),
            redis_key: defaults::redis_key(),
            github_repo: None,
            github_path: defaults::state_file(),
            github_branch: defaults::github_branch(),
            github_api: defaults::github_api(),
            s3_bucket: None,
            s3_key: defaults::state_file(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn base_url() -> String {
        "https://playvalorant.com".into()
    }
    pub fn news_page() -> String {
        "/en-us/news/".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            .into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn regions() -> Vec<String> {
        [
            "ar-ae", "de-de", "en-us", "en-gb", "es-es", "es-mx", "fr-fr", "id-id", "it-it",
            "ja-jp", "ko-kr", "pl-pl", "pt-br", "ru-ru", "th-th", "tr-tr", "vi-vn", "zh-tw",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    // Schedule defaults
    pub fn interval() -> u64 {
        300
    }
    pub fn region_delay() -> u64 {
        1000
    }
    pub fn retry_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        1000
    }
    pub fn heartbeat() -> u64 {
        3600
    }

    // Discord defaults
    pub fn discord_api() -> String {
        "https://discord.com/api/v10".into()
    }
    pub fn footer() -> String {
        "VALORANT News".into()
    }
    pub fn color() -> u32 {
        0xFF4655
    }

    // Storage defaults
    pub fn state_file() -> String {
        "news_state.json".into()
    }
    pub fn redis_key() -> String {
        "news_state".into()
    }
    pub fn github_branch() -> String {
        "main".into()
    }
    pub fn github_api() -> String {
        "https://api.github.com".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.discord.webhook_url = Some("https://discord.com/api/webhooks/1/abc".into());
        config
    }

    #[test]
    fn validate_default_with_destination_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_destination() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = valid_config();
        config.source.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = valid_config();
        config.schedule.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_checks_backend_settings() {
        let mut config = valid_config();
        config.storage.backend = StorageBackend::Github;
        assert!(config.validate().is_err());

        config.storage.github_repo = Some("someone/bot-state".into());
        assert!(config.validate().is_ok());

        config.storage.backend = StorageBackend::S3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_regions_are_normalized() {
        let regions = Config::default().regions().unwrap();
        assert_eq!(regions.len(), 18);
        assert!(regions.iter().all(|r| r.as_str() == r.as_str().to_lowercase()));
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [source]
            regions = ["en-us", "PT-BR"]

            [schedule]
            interval_secs = 60

            [storage]
            backend = "redis"
            "#,
        )
        .unwrap();

        assert_eq!(config.source.base_url, "https://playvalorant.com");
        assert_eq!(config.schedule.interval_secs, 60);
        assert_eq!(config.schedule.retry_attempts, 3);
        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(config.regions().unwrap()[1].as_str(), "pt-br");
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("DISCORD_CHANNEL_ID", "123456"),
            ("CHECK_INTERVAL_SECS", "90"),
            ("STATE_BACKEND", "github"),
            ("GITHUB_REPO", "someone/state"),
            ("HEARTBEAT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.discord.channel_id.as_deref(), Some("123456"));
        assert_eq!(config.schedule.interval_secs, 90);
        assert_eq!(config.schedule.heartbeat_secs, 3600);
        assert_eq!(config.storage.backend, StorageBackend::Github);
        assert!(config.validate().is_ok());
    }
}
