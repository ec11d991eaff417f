//! GitHub repository state store.
//!
//! Keeps the document as one file in a repository through the contents API.
//! Every write must carry the blob sha observed by the last read; GitHub
//! rejects the write when the file moved in between.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{SeenState, StorageConfig};
use crate::storage::StateStore;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const COMMIT_MESSAGE: &str = "Update news state";

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    content: UpdatedContent,
}

#[derive(Debug, Deserialize)]
struct UpdatedContent {
    sha: String,
}

/// Contents API backend.
pub struct GithubStateStore {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    path: String,
    branch: String,
    token: String,
    /// Blob sha from the last read or write, `None` when the file is absent.
    sha: Mutex<Option<String>>,
}

impl GithubStateStore {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        branch: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let api_base: String = api_base.into();
        let path: String = path.into();
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.into(),
            path: path.trim_start_matches('/').to_string(),
            branch: branch.into(),
            token: token.into(),
            sha: Mutex::new(None),
        }
    }

    pub fn from_config(
        client: reqwest::Client,
        config: &StorageConfig,
        token: impl Into<String>,
    ) -> Result<Self> {
        let repo = config
            .github_repo
            .clone()
            .ok_or_else(|| AppError::config("storage.github_repo is required"))?;
        Ok(Self::new(
            client,
            &config.github_api,
            repo,
            &config.github_path,
            &config.github_branch,
            token,
        ))
    }

    fn contents_url(&self) -> String {
        format!("{}/repos/{}/contents/{}", self.api_base, self.repo, self.path)
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.contents_url())
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

/// Decode the base64 payload GitHub returns, which is wrapped at 60 columns.
fn decode_content(content: &str) -> Result<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| AppError::storage(format!("invalid base64 from GitHub: {e}")))
}

#[async_trait]
impl StateStore for GithubStateStore {
    async fn load(&self) -> Result<SeenState> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                log::warn!("No state file at {}, starting empty", self.describe());
                *self.sha.lock().await = None;
                Ok(SeenState::new())
            }
            status if status.is_success() => {
                let body: ContentsResponse = response.json().await?;
                let bytes = decode_content(&body.content)?;
                *self.sha.lock().await = Some(body.sha);
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(SeenState::new());
                }
                SeenState::from_slice(&bytes)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Permission(
                format!("GitHub refused read of {}", self.describe()),
            )),
            status => Err(AppError::storage(format!(
                "GitHub read of {} returned {}",
                self.describe(),
                status
            ))),
        }
    }

    async fn save(&self, state: &SeenState) -> Result<()> {
        let mut sha = self.sha.lock().await;
        let body = UpdateRequest {
            message: COMMIT_MESSAGE,
            content: general_purpose::STANDARD.encode(state.to_vec_pretty()?),
            branch: &self.branch,
            sha: sha.clone(),
        };

        let response = self
            .request(reqwest::Method::PUT)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let updated: UpdateResponse = response.json().await?;
                *sha = Some(updated.content.sha);
                log::debug!("Committed state to {}", self.describe());
                Ok(())
            }
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(AppError::StaleRevision(format!(
                    "{} changed since it was read",
                    self.describe()
                )))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(AppError::Permission(format!(
                    "GitHub refused write to {}",
                    self.describe()
                )))
            }
            status => Err(AppError::storage(format!(
                "GitHub write to {} returned {}",
                self.describe(),
                status
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("github:{}@{}/{}", self.repo, self.branch, self.path)
    }
}
