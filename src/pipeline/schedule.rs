// src/pipeline/schedule.rs

//! Fixed-interval scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::error::Result;
use crate::models::ScheduleConfig;
use crate::pipeline::watch::{NewsWatcher, PassOutcome};
use crate::services::{NewsSource, Notifier};

/// Run passes every `interval_secs` until SIGINT or SIGTERM, then close the
/// store.
pub async fn run_forever<S, N>(watcher: Arc<NewsWatcher<S, N>>, schedule: &ScheduleConfig) -> Result<()>
where
    S: NewsSource + 'static,
    N: Notifier + 'static,
{
    run_until(watcher, schedule, shutdown_signal()).await
}

/// Run passes every `interval_secs` until `shutdown` resolves.
///
/// Each tick spawns its pass so a slow pass never delays the timer; the
/// watcher's guard drops ticks that land while a pass is still running.
/// On shutdown a pass in flight is allowed to finish and save before the
/// store is closed.
pub async fn run_until<S, N, F>(
    watcher: Arc<NewsWatcher<S, N>>,
    schedule: &ScheduleConfig,
    shutdown: F,
) -> Result<()>
where
    S: NewsSource + 'static,
    N: Notifier + 'static,
    F: Future<Output = ()>,
{
    let mut ticker = interval(Duration::from_secs(schedule.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let heartbeat_every = Duration::from_secs(schedule.heartbeat_secs);
    let mut heartbeat = interval(heartbeat_every.max(Duration::from_secs(1)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first heartbeat tick fires immediately; skip it.
    heartbeat.tick().await;

    log::info!(
        "Watching {} regions every {}s",
        watcher.regions().len(),
        schedule.interval_secs
    );

    tokio::pin!(shutdown);
    let mut last_pass: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let watcher = Arc::clone(&watcher);
                last_pass = Some(tokio::spawn(async move {
                    match watcher.run_pass().await {
                        Ok(PassOutcome::Completed(_)) | Ok(PassOutcome::Skipped) => {}
                        Err(e) => log::error!("Pass aborted: {}", e),
                    }
                }));
            }
            _ = heartbeat.tick(), if !heartbeat_every.is_zero() => {
                if let Err(e) = watcher.heartbeat().await {
                    log::warn!("Heartbeat failed: {}", e);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    log::info!("Shutting down, waiting for the running pass");
    if let Some(pass) = last_pass {
        if let Err(e) = pass.await {
            log::error!("Pass task failed: {}", e);
        }
    }
    watcher.wait_idle().await;
    watcher.close().await
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => log::info!("Received Ctrl-C"),
        _ = terminate => log::info!("Received SIGTERM"),
    }
}
