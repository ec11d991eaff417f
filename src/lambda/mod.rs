// src/lambda/mod.rs

//! AWS Lambda handler for the watcher.
//!
//! Each scheduled invocation runs exactly one pass against the configured
//! state store (normally S3) and returns a JSON summary.

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::Result;
use crate::models::{Config, StorageBackend};
use crate::pipeline::{PassOutcome, PassReport, watch::LiveWatcher};

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct WatchRequest {
    /// Mark current posts as seen without notifying
    #[serde(default)]
    pub seed: bool,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct WatchResponse {
    pub success: bool,

    /// True when another invocation still held the pass
    pub skipped: bool,

    pub regions_checked: usize,
    pub delivered: usize,
    pub failed: usize,
    pub saved: bool,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl WatchResponse {
    fn from_outcome(outcome: PassOutcome) -> Self {
        match outcome {
            PassOutcome::Skipped => Self {
                success: true,
                skipped: true,
                ..Default::default()
            },
            PassOutcome::Completed(PassReport {
                regions_checked,
                delivered,
                failed,
                saved,
                ..
            }) => Self {
                success: true,
                regions_checked,
                delivered,
                failed,
                saved,
                ..Default::default()
            },
        }
    }
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<WatchRequest>,
) -> std::result::Result<WatchResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();

    info!("Starting pass: seed={}", request.seed);

    let mut response = match run_once(&request).await {
        Ok(outcome) => WatchResponse::from_outcome(outcome),
        Err(e) => {
            error!("Pass failed: {}", e);
            WatchResponse {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    };
    response.execution_time_ms = start.elapsed().as_millis() as u64;

    info!(
        "Pass finished: {} delivered, {} failed in {}ms",
        response.delivered, response.failed, response.execution_time_ms
    );
    Ok(response)
}

async fn run_once(request: &WatchRequest) -> Result<PassOutcome> {
    let config = load_lambda_config()?;
    config.validate()?;

    let watcher = LiveWatcher::from_config(&config).await?;
    let outcome = if request.seed {
        watcher.seed_pass().await
    } else {
        watcher.run_pass().await
    };
    watcher.close().await?;
    outcome
}

/// Load configuration suitable for Lambda environment.
///
/// There is no config file in the function package; everything comes from
/// the environment and the state lives in S3 unless told otherwise.
fn load_lambda_config() -> Result<Config> {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::S3;
    config.apply_env();

    if let Ok(regions) = std::env::var("REGIONS") {
        config.source.regions = regions
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
    }

    Ok(config)
}
