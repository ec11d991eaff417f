//! Seen-state persistence.
//!
//! The whole seen-state is one JSON document mapping region codes to the
//! content keys already announced:
//!
//! ```text
//! {
//!   "en-us": ["blt1", "blt2"],
//!   "ko-kr": ["blt9"]
//! }
//! ```
//!
//! Every backend loads and saves that document as a unit. A missing
//! document is an empty state, not an error.

pub mod github;
pub mod local;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{SeenState, StorageBackend, StorageConfig};
use crate::utils::http::create_api_client;

pub use github::GithubStateStore;
pub use local::FileStateStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStateStore;
#[cfg(feature = "s3")]
pub use s3::S3StateStore;

/// Trait for seen-state backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the document. A missing document yields an empty state.
    async fn load(&self) -> Result<SeenState>;

    /// Replace the stored document.
    async fn save(&self, state: &SeenState) -> Result<()>;

    /// Release connections. Called once on shutdown.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Human readable location, for logs.
    fn describe(&self) -> String;
}

/// Load the state, degrading to empty when the backend fails.
///
/// A pass must still run when the backend is unreachable; the cost is that
/// posts may be announced twice.
pub async fn load_or_empty(store: &dyn StateStore) -> SeenState {
    match store.load().await {
        Ok(state) => state,
        Err(e) => {
            log::error!(
                "Failed to load state from {}: {}, starting empty",
                store.describe(),
                e
            );
            SeenState::new()
        }
    }
}

/// Open the backend selected in config.
pub async fn open_store(config: &StorageConfig) -> Result<Box<dyn StateStore>> {
    let store: Box<dyn StateStore> = match config.backend {
        StorageBackend::File => Box::new(FileStateStore::new(&config.file_path)),
        StorageBackend::Github => {
            let token = std::env::var("GITHUB_TOKEN")
                .map_err(|_| AppError::config("GITHUB_TOKEN is required for the github backend"))?;
            Box::new(GithubStateStore::from_config(
                create_api_client(30)?,
                config,
                token,
            )?)
        }
        #[cfg(feature = "redis")]
        StorageBackend::Redis => {
            let url = std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
            Box::new(RedisStateStore::connect(&url, &config.redis_key).await?)
        }
        #[cfg(not(feature = "redis"))]
        StorageBackend::Redis => {
            return Err(AppError::config(
                "redis backend requires the 'redis' feature",
            ));
        }
        #[cfg(feature = "s3")]
        StorageBackend::S3 => Box::new(S3StateStore::from_config(config).await?),
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => {
            return Err(AppError::config("s3 backend requires the 's3' feature"));
        }
    };

    log::info!("Using state store {}", store.describe());
    Ok(store)
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<SeenState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a document.
    pub fn with_state(state: SeenState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Last saved document, if any.
    pub async fn snapshot(&self) -> Option<SeenState> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<SeenState> {
        Ok(self.state.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, state: &SeenState) -> Result<()> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
