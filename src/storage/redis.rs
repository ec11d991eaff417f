//! Redis state store.
//!
//! The document is held as a JSON string under a single key.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::SeenState;
use crate::storage::StateStore;

/// Key-value backend over a managed connection.
pub struct RedisStateStore {
    /// `None` once the store has been closed.
    conn: Mutex<Option<ConnectionManager>>,
    key: String,
    url: String,
}

impl RedisStateStore {
    /// Open a managed connection. Reconnects are handled by the manager.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        log::info!("Connected to Redis");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            key: key.into(),
            url: redacted(url),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.conn
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::storage(format!("redis store {} is closed", self.url)))
    }
}

/// Strip credentials from a connection URL for logging.
fn redacted(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((scheme_and_auth, host)) => {
            let scheme = scheme_and_auth.split("://").next().unwrap_or("redis");
            format!("{scheme}://***@{host}")
        }
        None => url.to_string(),
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load(&self) -> Result<SeenState> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(&self.key).await?;
        match raw {
            Some(doc) if !doc.trim().is_empty() => SeenState::from_slice(doc.as_bytes()),
            _ => Ok(SeenState::new()),
        }
    }

    async fn save(&self, state: &SeenState) -> Result<()> {
        let mut conn = self.connection().await?;
        let doc = serde_json::to_string(state)?;
        conn.set::<_, _, ()>(&self.key, doc).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Dropping the last manager handle closes the socket.
        if self.conn.lock().await.take().is_some() {
            log::info!("Closed Redis connection to {}", self.url);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("redis:{}#{}", self.url, self.key)
    }
}
