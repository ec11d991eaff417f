//! AWS S3 state store.
//!
//! The document lives at `s3://{bucket}/{key}` and is replaced on every save.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::models::{SeenState, StorageConfig};
use crate::storage::StateStore;

/// S3 object backend.
pub struct S3StateStore {
    client: Client,
    bucket: String,
    key: String,
}

impl S3StateStore {
    pub fn new(client: Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Create the store using the ambient AWS configuration.
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let bucket = config
            .s3_bucket
            .clone()
            .ok_or_else(|| AppError::config("storage.s3_bucket is required"))?;
        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(Client::new(&aws), bucket, &config.s3_key))
    }
}

#[async_trait]
impl StateStore for S3StateStore {
    async fn load(&self) -> Result<SeenState> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(AppError::storage)?
                    .into_bytes();
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(SeenState::new());
                }
                SeenState::from_slice(&bytes)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::warn!("No existing state at {}", self.describe());
                    Ok(SeenState::new())
                } else {
                    Err(AppError::storage(service_err))
                }
            }
        }
    }

    async fn save(&self, state: &SeenState) -> Result<()> {
        let body = ByteStream::from(state.to_vec_pretty()?);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(body)
            .content_type("application/json")
            .send()
            .await
            .map_err(AppError::storage)?;

        log::info!(
            "Wrote {} keys to {}",
            state.total_count(),
            self.describe()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        let store = S3StateStore::new(Client::from_conf(conf), "bot-state", "news_state.json");
        assert_eq!(store.describe(), "s3://bot-state/news_state.json");
    }
}
