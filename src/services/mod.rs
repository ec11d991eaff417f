//! Service layer for the news watcher.
//!
//! This module contains the business logic for:
//! - Version token resolution (`VersionResolver`)
//! - Post extraction from page data (`extract_posts`)
//! - Regional news fetching (`NewsFetcher`)
//! - Discord delivery (`DiscordNotifier`)

mod discord;
mod extract;
mod news;
mod notify;
mod version;

pub use discord::{DiscordNotifier, DiscordTarget};
pub use extract::{STRATEGIES, ShapeStrategy, extract_posts};
pub use news::{FetchStats, NewsFetcher, NewsSource};
pub use notify::{DEFAULT_DESCRIPTION, LogNotifier, Notification, Notifier, truncate};
pub use version::{VersionResolver, extract_build_id};
