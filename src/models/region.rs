//! Region code.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

/// A locale/market variant of the news feed, e.g. `pt-br`.
///
/// Codes are normalized to lower case on construction. The upstream accepts
/// lower-case codes everywhere, and persisted state keys use the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Parse and normalize a region code.
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_lowercase();
        if code.is_empty() {
            return Err(AppError::validation("region code is empty"));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(AppError::validation(format!(
                "region code '{code}' contains invalid characters"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Region::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse a list of codes, dropping duplicates after normalization.
pub fn parse_regions<S: AsRef<str>>(codes: &[S]) -> Result<Vec<Region>> {
    let mut regions: Vec<Region> = Vec::with_capacity(codes.len());
    for code in codes {
        let region = Region::new(code.as_ref())?;
        if !regions.contains(&region) {
            regions.push(region);
        }
    }
    Ok(regions)
}
