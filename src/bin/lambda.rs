//! AWS Lambda entry point for Newswatch
//!
//! Deploy with `cargo lambda build --release --features lambda`
//! and trigger it from an EventBridge schedule.

use lambda_runtime::{Error as LambdaError, service_fn};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    // `log` records from the library are forwarded through tracing-log.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Newswatch Lambda starting...");
    lambda_runtime::run(service_fn(newswatch::lambda::handler)).await
}
