//! Newswatch CLI
//!
//! Local execution entry point. For AWS Lambda, use `newswatch-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use newswatch::{
    error::Result,
    models::Config,
    pipeline::{self, NewsWatcher, PassOutcome, PassReport, watch::LiveWatcher},
    services::{LogNotifier, NewsFetcher, VersionResolver},
    storage::{self, MemoryStateStore, StateStore},
    utils::http,
};

/// Newswatch - regional game news to Discord
#[derive(Parser, Debug)]
#[command(
    name = "newswatch",
    version,
    about = "Posts new regional news articles to a Discord channel"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "storage/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll on the configured interval until interrupted
    Run,

    /// Run a single pass
    Check {
        /// Log notifications instead of sending them, and keep state in memory
        #[arg(long)]
        dry_run: bool,
    },

    /// Mark every current post as seen without notifying
    Seed,

    /// Validate configuration
    Validate,

    /// Show seen-state counts per region
    Info,

    /// Resolve and print the current version token
    Token,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn log_report(report: &PassReport) {
    log::info!(
        "Checked {} regions: {} posts, {} delivered, {} failed, state {}",
        report.regions_checked,
        report.posts_seen,
        report.delivered,
        report.failed,
        if report.saved { "saved" } else { "unchanged" }
    );
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Newswatch starting...");

    let mut config = Config::load_or_default(&cli.config);
    config.apply_env();
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run => {
            config.validate()?;
            let watcher = Arc::new(LiveWatcher::from_config(&config).await?);
            pipeline::run_forever(watcher, &config.schedule).await?;
        }

        Command::Check { dry_run: false } => {
            config.validate()?;
            let watcher = LiveWatcher::from_config(&config).await?;
            let outcome = watcher.run_pass().await;
            watcher.close().await?;
            if let PassOutcome::Completed(report) = outcome? {
                log_report(&report);
            }
        }

        Command::Check { dry_run: true } => {
            let source = NewsFetcher::new(
                http::create_async_client(&config.source)?,
                &config.source,
                &config.schedule,
            );

            // Start from the real state but never write it back.
            let real = storage::open_store(&config.storage).await?;
            let seeded = storage::load_or_empty(real.as_ref()).await;
            real.close().await?;
            let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::with_state(seeded));

            let watcher = NewsWatcher::new(
                source,
                LogNotifier,
                store,
                config.regions()?,
                &config.source.base_url,
            )
            .with_region_delay(std::time::Duration::from_millis(
                config.schedule.region_delay_ms,
            ));

            if let PassOutcome::Completed(report) = watcher.run_pass().await? {
                log_report(&report);
            }
        }

        Command::Seed => {
            // Seeding never posts, so no Discord destination is needed.
            let watcher = NewsWatcher::with_notifier(&config, LogNotifier).await?;
            let outcome = watcher.seed_pass().await;
            watcher.close().await?;
            if let PassOutcome::Completed(report) = outcome? {
                log::info!(
                    "Seeded {} posts across {} regions",
                    report.posts_seen,
                    report.regions_checked
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({} regions)", config.regions()?.len());

            log::info!("All validations passed!");
        }

        Command::Info => {
            let store = storage::open_store(&config.storage).await?;
            let state = store.load().await?;
            store.close().await?;

            log::info!("State store: {}", store.describe());
            if state.is_empty() {
                log::info!("No state recorded yet.");
            }
            for (region, count) in state.regions() {
                log::info!("  {:<8} {} seen", region, count);
            }
            log::info!(
                "Total: {} keys across {} regions",
                state.total_count(),
                state.region_count()
            );
        }

        Command::Token => {
            let resolver = VersionResolver::new(
                http::create_async_client(&config.source)?,
                &config.source,
            );
            let token = resolver.resolve().await.map_err(|e| {
                log::error!("Could not resolve token from {}", resolver.page_url());
                e
            })?;
            println!("{token}");
        }
    }

    log::info!("Done!");

    Ok(())
}
