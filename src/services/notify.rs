// src/services/notify.rs

//! Notification rendering and the delivery seam.

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;
use crate::models::{PostRecord, Region};
use crate::utils::resolve_link;

/// Shown when a post has no body text.
pub const DEFAULT_DESCRIPTION: &str = "No description available.";

/// Discord counts these limits in characters, not graphemes.
const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;

/// A rendered notification for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub region: Region,
    pub title: String,
    pub description: String,
    /// RFC 3339 publication time
    pub timestamp: Option<String>,
    pub thumbnail: Option<String>,
    /// Absolute URL of the post
    pub link: Option<String>,
}

impl Notification {
    /// Render a post. Relative links are resolved against `base_url`.
    pub fn from_post(post: &PostRecord, region: &Region, base_url: &str) -> Self {
        let description = post
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION);

        Self {
            region: region.clone(),
            title: truncate(post.title.trim(), MAX_TITLE),
            description: truncate(description, MAX_DESCRIPTION),
            timestamp: post.published().map(|dt| dt.to_rfc3339()),
            thumbnail: post.thumbnail.clone(),
            link: post
                .link
                .as_deref()
                .filter(|l| !l.trim().is_empty())
                .map(|l| resolve_link(base_url, l)),
        }
    }
}

/// Cut text to at most `max` characters, marking the cut with an ellipsis.
///
/// The cut always falls on a grapheme boundary, so a base letter never
/// loses its combining marks.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }

    // One character is reserved for the ellipsis.
    let budget = max - 1;
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let len = grapheme.chars().count();
        if used + len > budget {
            break;
        }
        out.push_str(grapheme);
        used += len;
    }
    out.push('…');
    out
}

/// Delivers notifications to the chat destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Verify the destination exists and accepts messages.
    async fn check_destination(&self) -> Result<()>;

    /// Deliver one post notification.
    async fn deliver(&self, notification: &Notification) -> Result<()>;

    /// Send a plain text message (heartbeat).
    async fn send_text(&self, text: &str) -> Result<()>;
}

/// Notifier that only writes to the log. Used for dry runs.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn check_destination(&self) -> Result<()> {
        Ok(())
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        log::info!(
            "[dry-run] {} | {} | {}",
            notification.region,
            notification.title,
            notification.link.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        log::info!("[dry-run] {}", text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Region {
        Region::new("en-us").unwrap()
    }

    #[test]
    fn test_from_post_full() {
        let post = PostRecord {
            id: Some("blt1".into()),
            title: "Patch Notes".into(),
            description: Some("Balance changes".into()),
            published_at: Some("2024-08-27T17:00:00.000Z".into()),
            thumbnail: Some("https://cdn.example.com/t.jpg".into()),
            link: Some("/en-us/news/game-updates/patch/".into()),
        };
        let n = Notification::from_post(&post, &region(), "https://playvalorant.com");

        assert_eq!(n.title, "Patch Notes");
        assert_eq!(n.description, "Balance changes");
        assert_eq!(n.timestamp.as_deref(), Some("2024-08-27T17:00:00+00:00"));
        assert_eq!(
            n.link.as_deref(),
            Some("https://playvalorant.com/en-us/news/game-updates/patch/")
        );
    }

    #[test]
    fn test_from_post_defaults() {
        let post = PostRecord {
            title: "Bare".into(),
            description: Some("   ".into()),
            ..Default::default()
        };
        let n = Notification::from_post(&post, &region(), "https://playvalorant.com");

        assert_eq!(n.description, DEFAULT_DESCRIPTION);
        assert!(n.timestamp.is_none());
        assert!(n.link.is_none());
        assert!(n.thumbnail.is_none());
    }

    #[test]
    fn test_external_link_unchanged() {
        let post = PostRecord {
            title: "Video".into(),
            link: Some("https://www.youtube.com/watch?v=x".into()),
            ..Default::default()
        };
        let n = Notification::from_post(&post, &region(), "https://playvalorant.com");
        assert_eq!(n.link.as_deref(), Some("https://www.youtube.com/watch?v=x"));
    }

    #[test]
    fn test_truncate_is_grapheme_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 4), "abc…");

        // Each flag is two characters; half a flag is never kept.
        let flags = "🇰🇷🇯🇵🇧🇷";
        assert_eq!(truncate(flags, 5), "🇰🇷🇯🇵…");
        assert_eq!(truncate(flags, 4), "🇰🇷…");
        assert_eq!(truncate(flags, 2), "…");
    }

    #[test]
    fn test_combining_marks_stay_within_char_limit() {
        // Thai consonant plus vowel mark: one grapheme, two characters.
        let post = PostRecord {
            title: "ข่าว".repeat(100),
            description: Some("กิ".repeat(5000)),
            ..Default::default()
        };
        let n = Notification::from_post(&post, &region(), "https://playvalorant.com");

        assert!(n.description.chars().count() <= MAX_DESCRIPTION);
        assert!(n.title.chars().count() <= MAX_TITLE);

        let kept = n.description.strip_suffix('…').unwrap();
        assert_eq!(kept, "กิ".repeat(2047));
    }
}
