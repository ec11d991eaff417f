//! Local filesystem state store.
//!
//! Keeps the seen-state in a single JSON file. Writes go to a sibling temp
//! file first and are renamed into place, so a crash mid-write leaves the
//! previous document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::SeenState;
use crate::storage::StateStore;

/// JSON file backend.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<SeenState> {
        match self.read_bytes().await? {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                SeenState::from_slice(&bytes)
            }
            Some(_) => Ok(SeenState::new()),
            None => {
                log::warn!("No state file at {}, starting empty", self.path.display());
                Ok(SeenState::new())
            }
        }
    }

    async fn save(&self, state: &SeenState) -> Result<()> {
        self.write_bytes(&state.to_vec_pretty()?).await?;
        log::debug!(
            "Saved {} keys across {} regions to {}",
            state.total_count(),
            state.region_count(),
            self.path.display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
