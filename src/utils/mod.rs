//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a post action link for display.
///
/// Absolute `http(s)` links pass through unchanged. Anything else is treated
/// as a path on the publisher's origin.
pub fn resolve_link(base_url: &str, link: &str) -> String {
    let link = link.trim();
    if let Ok(parsed) = Url::parse(link) {
        if matches!(parsed.scheme(), "http" | "https") {
            return link.to_string();
        }
    }

    match Url::parse(base_url) {
        Ok(mut origin) => {
            origin.set_path("/");
            origin.set_query(None);
            origin.set_fragment(None);
            resolve_url(&origin, link)
        }
        Err(_) => format!("{}/{}", base_url.trim_end_matches('/'), link.trim_start_matches('/')),
    }
}

/// Join a base URL and a path without doubling or dropping slashes.
pub fn join_path(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
