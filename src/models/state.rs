//! Seen-state document.
//!
//! Persisted layout is a JSON object keyed by region code, each value the
//! list of content keys already delivered for that region:
//!
//! ```json
//! { "en-us": ["blt1", "blt2"], "pt-br": ["blt9"] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Region;

/// Content keys already notified, partitioned by region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenState {
    regions: BTreeMap<String, Vec<String>>,
}

impl SeenState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a persisted document and normalize its region keys.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let state: SeenState = serde_json::from_slice(bytes)?;
        Ok(state.normalized())
    }

    /// Encode the whole document for a replace-whole-document write.
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Fold keys that only differ by case into one lower-case entry.
    ///
    /// Insertion order is kept and duplicates are dropped.
    pub fn normalized(self) -> Self {
        let mut merged = Self::new();
        for (code, keys) in self.regions {
            let entry = merged
                .regions
                .entry(code.trim().to_ascii_lowercase())
                .or_default();
            for key in keys {
                if !entry.contains(&key) {
                    entry.push(key);
                }
            }
        }
        merged
    }

    /// Seen keys for a region, creating an empty entry if missing.
    pub fn entry(&mut self, region: &Region) -> &mut Vec<String> {
        self.regions.entry(region.as_str().to_string()).or_default()
    }

    /// Seen keys for a region, if any were recorded.
    pub fn get(&self, region: &Region) -> Option<&[String]> {
        self.regions.get(region.as_str()).map(Vec::as_slice)
    }

    pub fn contains(&self, region: &Region, key: &str) -> bool {
        self.get(region)
            .is_some_and(|keys| keys.iter().any(|k| k == key))
    }

    /// Record a key as delivered. Returns `false` if it was already present.
    pub fn mark_seen(&mut self, region: &Region, key: &str) -> bool {
        let entry = self.entry(region);
        if entry.iter().any(|k| k == key) {
            return false;
        }
        entry.push(key.to_string());
        true
    }

    /// Fold another document into this one. Returns the number of keys added.
    pub fn merge(&mut self, other: &SeenState) -> usize {
        let mut added = 0;
        for (code, keys) in &other.regions {
            let entry = self.regions.entry(code.clone()).or_default();
            for key in keys {
                if !entry.contains(key) {
                    entry.push(key.clone());
                    added += 1;
                }
            }
        }
        added
    }

    /// Region codes with an entry, in key order.
    pub fn regions(&self) -> impl Iterator<Item = (&str, usize)> {
        self.regions.iter().map(|(k, v)| (k.as_str(), v.len()))
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn total_count(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
