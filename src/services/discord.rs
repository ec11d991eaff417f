// src/services/discord.rs

//! Discord delivery over the REST API.
//!
//! Supports an incoming webhook or a channel message endpoint with a bot
//! token. No gateway session is opened.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::DiscordConfig;
use crate::services::notify::{Notification, Notifier, truncate};

/// Discord rejects embeds whose text fields add up to more than this.
const MAX_EMBED_TOTAL: usize = 6000;

/// Where messages are posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscordTarget {
    Webhook(String),
    Channel { id: String, token: String },
}

impl DiscordTarget {
    /// Pick the target from config. A webhook URL wins over a channel id.
    pub fn from_config(config: &DiscordConfig, bot_token: Option<String>) -> Result<Self> {
        if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(Self::Webhook(url.to_string()));
        }

        let id = config
            .channel_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::MissingDestination("no webhook or channel configured".into()))?;
        let token = bot_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::config("DISCORD_TOKEN is required for channel delivery"))?;

        Ok(Self::Channel { id, token })
    }
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a str>,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedUrl<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField<'a>>,
    footer: EmbedFooter,
}

#[derive(Debug, Serialize)]
struct EmbedUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedField<'a> {
    name: &'a str,
    value: &'a str,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

/// Discord notifier.
pub struct DiscordNotifier {
    client: reqwest::Client,
    target: DiscordTarget,
    api_base: String,
    username: Option<String>,
    footer: String,
    color: u32,
}

impl DiscordNotifier {
    pub fn new(client: reqwest::Client, target: DiscordTarget, config: &DiscordConfig) -> Self {
        Self {
            client,
            target,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            footer: config.footer.clone(),
            color: config.color,
        }
    }

    /// Build from config, reading the bot token from `DISCORD_TOKEN`.
    pub fn from_config(client: reqwest::Client, config: &DiscordConfig) -> Result<Self> {
        let target = DiscordTarget::from_config(config, std::env::var("DISCORD_TOKEN").ok())?;
        Ok(Self::new(client, target, config))
    }

    fn embed<'a>(&self, notification: &'a Notification) -> Embed<'a> {
        let fields = notification
            .link
            .as_deref()
            .map(|link| {
                vec![EmbedField {
                    name: "Read more",
                    value: link,
                    inline: false,
                }]
            })
            .unwrap_or_default();
        let footer = format!("{} • {}", self.footer, notification.region);

        let used = notification.title.chars().count()
            + footer.chars().count()
            + fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>();
        let description = truncate(
            &notification.description,
            MAX_EMBED_TOTAL.saturating_sub(used),
        );

        Embed {
            title: &notification.title,
            description,
            url: notification.link.as_deref(),
            timestamp: notification.timestamp.as_deref(),
            color: self.color,
            thumbnail: notification
                .thumbnail
                .as_deref()
                .map(|url| EmbedUrl { url }),
            fields,
            footer: EmbedFooter { text: footer },
        }
    }

    async fn post(&self, payload: &MessagePayload<'_>) -> Result<()> {
        let request = match &self.target {
            DiscordTarget::Webhook(url) => self.client.post(url).query(&[("wait", "true")]),
            DiscordTarget::Channel { id, token } => self
                .client
                .post(format!("{}/channels/{}/messages", self.api_base, id))
                .header(reqwest::header::AUTHORIZATION, format!("Bot {token}")),
        };

        let response = request.json(payload).send().await?;
        check_status(response, "message").await
    }
}

/// Map a Discord response to the error taxonomy.
async fn check_status(response: Response, what: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Permission(format!(
            "{what} rejected with {status}: {body}"
        ))),
        StatusCode::NOT_FOUND => Err(AppError::MissingDestination(format!(
            "{what} target not found: {body}"
        ))),
        _ => Err(AppError::delivery(status.as_u16(), body)),
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn check_destination(&self) -> Result<()> {
        let request = match &self.target {
            DiscordTarget::Webhook(url) => self.client.get(url),
            DiscordTarget::Channel { id, token } => self
                .client
                .get(format!("{}/channels/{}", self.api_base, id))
                .header(reqwest::header::AUTHORIZATION, format!("Bot {token}")),
        };

        let response = request.send().await?;
        check_status(response, "destination").await
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let payload = MessagePayload {
            username: self.username.as_deref(),
            content: None,
            embeds: vec![self.embed(notification)],
        };
        self.post(&payload).await?;
        log::info!("Delivered '{}' ({})", notification.title, notification.region);
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let payload = MessagePayload {
            username: self.username.as_deref(),
            content: Some(text),
            embeds: Vec::new(),
        };
        self.post(&payload).await
    }
}
