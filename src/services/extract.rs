// src/services/extract.rs

//! Post extraction from the regional news document.
//!
//! The publisher's page data has changed shape several times. Each known
//! shape is a strategy that returns the raw post items when it recognises
//! the document; strategies are tried in priority order and the first match
//! wins. An unrecognised document yields no posts rather than an error.

use serde_json::Value;

use crate::models::PostRecord;

/// Blade kind holding the article list, compared case-insensitively.
const ARTICLE_GRID: &str = "articlecardgrid";

/// A document shape recogniser.
pub type ShapeStrategy = fn(&Value) -> Option<Vec<Value>>;

/// Known shapes in priority order.
pub const STRATEGIES: &[(&str, ShapeStrategy)] = &[
    ("blades", from_blades),
    ("articles", from_articles),
    ("content", from_content),
    ("page.blades", from_page_blades),
];

/// Extract posts from a news document.
pub fn extract_posts(document: &Value) -> Vec<PostRecord> {
    let root = page_root(document);

    for (name, strategy) in STRATEGIES {
        if let Some(items) = strategy(root) {
            log::debug!("Document matched '{}' shape with {} items", name, items.len());
            return items.iter().filter_map(PostRecord::from_item).collect();
        }
    }

    log::warn!("No known post shape in news document");
    Vec::new()
}

/// Next.js data responses wrap the page in `pageProps`.
fn page_root(document: &Value) -> &Value {
    document.get("pageProps").unwrap_or(document)
}

fn from_blades(root: &Value) -> Option<Vec<Value>> {
    grid_items(root.get("blades")?)
}

fn from_articles(root: &Value) -> Option<Vec<Value>> {
    root.get("articles")?.as_array().cloned()
}

fn from_content(root: &Value) -> Option<Vec<Value>> {
    root.get("content")?.as_array().cloned()
}

fn from_page_blades(root: &Value) -> Option<Vec<Value>> {
    grid_items(root.get("page")?.get("blades")?)
}

/// Items of the first article grid blade.
fn grid_items(blades: &Value) -> Option<Vec<Value>> {
    let grid = blades.as_array()?.iter().find(|blade| {
        blade
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| kind.eq_ignore_ascii_case(ARTICLE_GRID))
    })?;

    Some(
        grid.get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    )
}
