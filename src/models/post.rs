//! News post data structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field paths tried in order when reading a post item.
const ID_PATHS: &[&[&str]] = &[
    &["analytics", "contentId"],
    &["contentId"],
    &["id"],
    &["uid"],
];
const TITLE_PATHS: &[&[&str]] = &[&["title"]];
const DESCRIPTION_PATHS: &[&[&str]] = &[&["description", "body"], &["description"]];
const PUBLISHED_PATHS: &[&[&str]] = &[&["publishedAt"], &["date"], &["publishDate"]];
const THUMBNAIL_PATHS: &[&[&str]] = &[
    &["media", "url"],
    &["thumbnail", "url"],
    &["imageUrl"],
    &["image", "url"],
];
const LINK_PATHS: &[&[&str]] = &[
    &["action", "payload", "url"],
    &["link", "url"],
    &["url"],
    &["externalLink"],
];

/// A single news post as published upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PostRecord {
    /// Publisher-assigned content identifier
    pub id: Option<String>,

    /// Post title
    pub title: String,

    /// Body text shown under the title
    pub description: Option<String>,

    /// Publication time as sent upstream (RFC 3339)
    pub published_at: Option<String>,

    /// Thumbnail image URL
    pub thumbnail: Option<String>,

    /// Action link, either a site-relative path or an absolute URL
    pub link: Option<String>,
}

impl PostRecord {
    /// Build a post from a raw item of the news document.
    ///
    /// Returns `None` for items that are not JSON objects.
    pub fn from_item(item: &Value) -> Option<Self> {
        if !item.is_object() {
            return None;
        }

        Some(Self {
            id: lookup(item, ID_PATHS),
            title: lookup(item, TITLE_PATHS).unwrap_or_default(),
            description: lookup(item, DESCRIPTION_PATHS),
            published_at: lookup(item, PUBLISHED_PATHS),
            thumbnail: lookup(item, THUMBNAIL_PATHS),
            link: lookup(item, LINK_PATHS),
        })
    }

    /// Deduplication key for this post.
    ///
    /// Uses the content identifier when present. Otherwise falls back to
    /// `title|published_at`, which changes if the post is edited upstream and
    /// can collide for posts sharing both fields.
    pub fn content_key(&self) -> String {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!(
                "{}|{}",
                self.title,
                self.published_at.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Parsed publication time.
    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// First non-empty string found along the given paths.
fn lookup(item: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let value = path.iter().try_fold(item, |node, key| node.get(*key))?;
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}
