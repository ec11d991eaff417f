// src/pipeline/watch.rs

//! Diff-and-notify pass.
//!
//! One pass loads the seen-state, walks every region in order, announces
//! posts whose content key is not yet recorded, and writes the document back
//! only when something new was delivered. Regions are fetched one at a time
//! with a fixed pause after each to stay under the publisher's rate limits.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Config, Region, SeenState};
use crate::services::{DiscordNotifier, NewsFetcher, NewsSource, Notification, Notifier};
use crate::storage::{StateStore, load_or_empty, open_store};
use crate::utils::http::{create_api_client, create_async_client};

/// Counters for one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub regions_checked: usize,
    pub posts_seen: usize,
    pub delivered: usize,
    pub failed: usize,
    pub saved: bool,
}

/// Result of asking for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass held the guard; nothing was done.
    Skipped,
    Completed(PassReport),
}

/// Long-lived orchestrator for the watch loop.
pub struct NewsWatcher<S, N> {
    source: S,
    notifier: N,
    store: Arc<dyn StateStore>,
    regions: Vec<Region>,
    base_url: String,
    region_delay: Duration,
    /// Re-entrancy guard. Also holds the document of a pass whose save
    /// failed, so the next pass can write it again.
    unsaved: Mutex<Option<SeenState>>,
}

impl<S: NewsSource, N: Notifier> NewsWatcher<S, N> {
    pub fn new(
        source: S,
        notifier: N,
        store: Arc<dyn StateStore>,
        regions: Vec<Region>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            notifier,
            store,
            regions,
            base_url: base_url.into(),
            region_delay: Duration::from_secs(1),
            unsaved: Mutex::new(None),
        }
    }

    /// Pause after each region fetch.
    pub fn with_region_delay(mut self, delay: Duration) -> Self {
        self.region_delay = delay;
        self
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Run one diff-and-notify pass.
    ///
    /// Returns `Skipped` without waiting when a pass is already running.
    /// Errors only for pass-fatal delivery problems.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let Ok(mut unsaved) = self.unsaved.try_lock() else {
            log::warn!("Previous pass still running, skipping this trigger");
            return Ok(PassOutcome::Skipped);
        };

        if let Err(e) = self.notifier.check_destination().await {
            if e.is_pass_fatal() {
                log::error!("Destination unusable, aborting pass: {}", e);
                return Err(e);
            }
            log::warn!("Destination check failed, continuing: {}", e);
        }

        let mut state = load_or_empty(self.store.as_ref()).await;
        let mut dirty = false;
        if let Some(pending) = unsaved.take() {
            let restored = state.merge(&pending);
            log::info!("Restored {} keys from an unsaved pass", restored);
            dirty = true;
        }

        let mut report = PassReport::default();
        let result = self.walk_regions(&mut state, &mut report, &mut dirty).await;

        if dirty {
            report.saved = self.persist(&state, &mut unsaved).await;
        }

        result?;
        log::info!(
            "Pass complete: {} regions, {} posts, {} delivered, {} failed",
            report.regions_checked,
            report.posts_seen,
            report.delivered,
            report.failed
        );
        Ok(PassOutcome::Completed(report))
    }

    async fn walk_regions(
        &self,
        state: &mut SeenState,
        report: &mut PassReport,
        dirty: &mut bool,
    ) -> Result<()> {
        for region in &self.regions {
            let posts = self.source.fetch_posts(region).await;
            report.regions_checked += 1;
            report.posts_seen += posts.len();
            state.entry(region);

            for post in &posts {
                let key = post.content_key();
                if state.contains(region, &key) {
                    continue;
                }

                let notification = Notification::from_post(post, region, &self.base_url);
                match self.notifier.deliver(&notification).await {
                    Ok(()) => {
                        state.mark_seen(region, &key);
                        report.delivered += 1;
                        *dirty = true;
                    }
                    Err(e) if e.is_pass_fatal() => {
                        log::error!("{}: delivery aborted: {}", region, e);
                        return Err(e);
                    }
                    Err(e) => {
                        log::error!("{}: failed to deliver '{}': {}", region, post.title, e);
                        report.failed += 1;
                    }
                }
            }

            tokio::time::sleep(self.region_delay).await;
        }
        Ok(())
    }

    /// Save the document; on failure keep it for the next pass.
    async fn persist(&self, state: &SeenState, unsaved: &mut Option<SeenState>) -> bool {
        match self.store.save(state).await {
            Ok(()) => {
                log::info!("State saved to {}", self.store.describe());
                true
            }
            Err(e) => {
                log::error!("Failed to save state to {}: {}", self.store.describe(), e);
                *unsaved = Some(state.clone());
                false
            }
        }
    }

    /// Mark every current post as seen without notifying, then save.
    ///
    /// Bootstraps a fresh store so the first real pass does not announce the
    /// whole back catalogue.
    pub async fn seed_pass(&self) -> Result<PassOutcome> {
        let Ok(_guard) = self.unsaved.try_lock() else {
            log::warn!("Pass running, skipping seed");
            return Ok(PassOutcome::Skipped);
        };

        let mut state = load_or_empty(self.store.as_ref()).await;
        let mut report = PassReport::default();

        for region in &self.regions {
            let posts = self.source.fetch_posts(region).await;
            report.regions_checked += 1;
            report.posts_seen += posts.len();
            state.entry(region);

            let added = posts
                .iter()
                .filter(|post| state.mark_seen(region, &post.content_key()))
                .count();
            log::info!("{}: seeded {} of {} posts", region, added, posts.len());

            tokio::time::sleep(self.region_delay).await;
        }

        self.store.save(&state).await?;
        report.saved = true;
        log::info!(
            "Seeded {} keys across {} regions into {}",
            state.total_count(),
            state.region_count(),
            self.store.describe()
        );
        Ok(PassOutcome::Completed(report))
    }

    /// Send the liveness message.
    pub async fn heartbeat(&self) -> Result<()> {
        let text = format!(
            "Still watching {} regions ({})",
            self.regions.len(),
            chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
        );
        self.notifier.send_text(&text).await
    }

    /// Wait until no pass is running.
    ///
    /// A pass that is mid-delivery finishes and saves before this returns.
    pub async fn wait_idle(&self) {
        let _guard = self.unsaved.lock().await;
    }

    /// Release the state backend.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

/// Watcher wired to the live site and Discord.
pub type LiveWatcher = NewsWatcher<NewsFetcher, DiscordNotifier>;

impl LiveWatcher {
    /// Build the production watcher from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let notifier = DiscordNotifier::from_config(
            create_api_client(config.source.timeout_secs)?,
            &config.discord,
        )?;
        Self::with_notifier(config, notifier).await
    }
}

impl<N: Notifier> NewsWatcher<NewsFetcher, N> {
    /// Build a watcher on the live site and configured store that delivers
    /// through `notifier`.
    pub async fn with_notifier(config: &Config, notifier: N) -> Result<Self> {
        let source_client = create_async_client(&config.source)?;
        let source = NewsFetcher::new(source_client, &config.source, &config.schedule);
        let store: Arc<dyn StateStore> = Arc::from(open_store(&config.storage).await?);

        Ok(NewsWatcher::new(
            source,
            notifier,
            store,
            config.regions()?,
            &config.source.base_url,
        )
        .with_region_delay(Duration::from_millis(config.schedule.region_delay_ms)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use base64::{Engine as _, engine::general_purpose};
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    use super::*;
    use crate::error::AppError;
    use crate::models::PostRecord;
    use crate::services::LogNotifier;
    use crate::storage::{FileStateStore, GithubStateStore, MemoryStateStore};

    #[derive(Default)]
    struct FakeSource {
        posts: StdMutex<HashMap<String, Vec<PostRecord>>>,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl FakeSource {
        fn with(region: &str, posts: Vec<PostRecord>) -> Self {
            let source = Self::default();
            source.set(region, posts);
            source
        }

        fn set(&self, region: &str, posts: Vec<PostRecord>) {
            self.posts.lock().unwrap().insert(region.to_string(), posts);
        }
    }

    #[async_trait]
    impl NewsSource for FakeSource {
        async fn fetch_posts(&self, region: &Region) -> Vec<PostRecord> {
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            self.posts
                .lock()
                .unwrap()
                .get(region.as_str())
                .cloned()
                .unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: StdMutex<Vec<String>>,
        fail_titles: Vec<String>,
        /// Titles whose delivery is refused outright
        denied_titles: Vec<String>,
        fatal: bool,
    }

    impl FakeNotifier {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn check_destination(&self) -> Result<()> {
            if self.fatal {
                return Err(AppError::MissingDestination("channel 42".into()));
            }
            Ok(())
        }

        async fn deliver(&self, notification: &Notification) -> Result<()> {
            if self.denied_titles.contains(&notification.title) {
                return Err(AppError::Permission("missing access".into()));
            }
            if self.fail_titles.contains(&notification.title) {
                return Err(AppError::delivery(500, "boom"));
            }
            self.sent.lock().unwrap().push(notification.title.clone());
            Ok(())
        }

        async fn send_text(&self, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn post(id: &str, title: &str) -> PostRecord {
        PostRecord {
            id: Some(id.into()),
            title: title.into(),
            published_at: Some("2024-08-27T17:00:00.000Z".into()),
            ..Default::default()
        }
    }

    fn regions(codes: &[&str]) -> Vec<Region> {
        codes.iter().map(|c| Region::new(c).unwrap()).collect()
    }

    fn watcher(
        source: FakeSource,
        notifier: FakeNotifier,
        store: Arc<dyn StateStore>,
        codes: &[&str],
    ) -> NewsWatcher<FakeSource, FakeNotifier> {
        NewsWatcher::new(source, notifier, store, regions(codes), "https://playvalorant.com")
            .with_region_delay(Duration::ZERO)
    }

    fn completed(outcome: PassOutcome) -> PassReport {
        match outcome {
            PassOutcome::Completed(report) => report,
            PassOutcome::Skipped => panic!("pass was skipped"),
        }
    }

    /// Store that counts saves and can be told to fail them.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStateStore,
        saves: StdMutex<usize>,
        fail_saves: StdMutex<bool>,
    }

    #[async_trait]
    impl StateStore for CountingStore {
        async fn load(&self) -> Result<SeenState> {
            self.inner.load().await
        }

        async fn save(&self, state: &SeenState) -> Result<()> {
            if *self.fail_saves.lock().unwrap() {
                return Err(AppError::storage("disk full"));
            }
            *self.saves.lock().unwrap() += 1;
            self.inner.save(state).await
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let store = Arc::new(CountingStore::default());
        let source = FakeSource::with("en-us", vec![post("a", "A"), post("b", "B")]);
        let w = watcher(source, FakeNotifier::default(), store.clone(), &["en-us"]);

        let first = completed(w.run_pass().await.unwrap());
        assert_eq!(first.delivered, 2);
        assert!(first.saved);

        let second = completed(w.run_pass().await.unwrap());
        assert_eq!(second.delivered, 0);
        assert!(!second.saved);

        assert_eq!(*store.saves.lock().unwrap(), 1);
        assert_eq!(w.notifier().sent(), ["A", "B"]);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_next_pass() {
        let store = Arc::new(MemoryStateStore::new());
        let source = FakeSource::with("en-us", vec![post("a", "A"), post("b", "B")]);
        let notifier = FakeNotifier {
            fail_titles: vec!["A".into()],
            ..Default::default()
        };
        let w = watcher(source, notifier, store.clone(), &["en-us"]);

        let report = completed(w.run_pass().await.unwrap());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);

        let saved = store.snapshot().await.unwrap();
        let en = Region::new("en-us").unwrap();
        assert!(!saved.contains(&en, "a"));
        assert!(saved.contains(&en, "b"));

        // Still unseen, so the next pass tries again.
        let report = completed(w.run_pass().await.unwrap());
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_each_distinct_id_notified_once() {
        let store = Arc::new(MemoryStateStore::new());
        // Same title and timestamp, different ids.
        let source = FakeSource::with("en-us", vec![post("a", "Same"), post("b", "Same")]);
        let w = watcher(source, FakeNotifier::default(), store, &["en-us"]);

        assert_eq!(completed(w.run_pass().await.unwrap()).delivered, 2);

        w.source.set("en-us", vec![post("c", "New"), post("a", "Same"), post("b", "Same")]);
        assert_eq!(completed(w.run_pass().await.unwrap()).delivered, 1);
        assert_eq!(w.notifier().sent(), ["Same", "Same", "New"]);
    }

    #[tokio::test]
    async fn test_regions_are_independent() {
        let store = Arc::new(MemoryStateStore::new());
        let source = FakeSource::with("en-us", vec![post("a", "A")]);
        source.set("ko-kr", vec![post("a", "A")]);
        let w = watcher(source, FakeNotifier::default(), store.clone(), &["en-us", "ko-kr", "ja-jp"]);

        let report = completed(w.run_pass().await.unwrap());
        assert_eq!(report.regions_checked, 3);
        assert_eq!(report.delivered, 2);

        let saved = store.snapshot().await.unwrap();
        assert_eq!(saved.region_count(), 3);
        assert!(saved.get(&Region::new("ja-jp").unwrap()).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_pause_per_region() {
        let store = Arc::new(MemoryStateStore::new());
        let w = watcher(
            FakeSource::default(),
            FakeNotifier::default(),
            store,
            &["en-us", "ko-kr", "ja-jp", "pt-br"],
        )
        .with_region_delay(Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        completed(w.run_pass().await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let source = FakeSource {
            gate: Some((entered.clone(), release.clone())),
            ..Default::default()
        };
        let w = Arc::new(watcher(
            source,
            FakeNotifier::default(),
            Arc::new(MemoryStateStore::new()),
            &["en-us"],
        ));

        let running = tokio::spawn({
            let w = Arc::clone(&w);
            async move { w.run_pass().await }
        });
        entered.notified().await;

        assert_eq!(w.run_pass().await.unwrap(), PassOutcome::Skipped);

        release.notify_one();
        let first = running.await.unwrap().unwrap();
        assert!(matches!(first, PassOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_missing_destination_aborts_pass() {
        let store = Arc::new(CountingStore::default());
        let source = FakeSource::with("en-us", vec![post("a", "A")]);
        let notifier = FakeNotifier {
            fatal: true,
            ..Default::default()
        };
        let w = watcher(source, notifier, store.clone(), &["en-us"]);

        let err = w.run_pass().await.unwrap_err();
        assert!(err.is_pass_fatal());
        assert!(w.notifier().sent().is_empty());
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fatal_mid_walk_keeps_earlier_deliveries() {
        let store = Arc::new(CountingStore::default());
        let source = FakeSource::with("en-us", vec![post("a", "A"), post("b", "B")]);
        source.set("ko-kr", vec![post("c", "C")]);
        let notifier = FakeNotifier {
            denied_titles: vec!["B".into()],
            ..Default::default()
        };
        let w = watcher(source, notifier, store.clone(), &["en-us", "ko-kr"]);

        let err = w.run_pass().await.unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));
        assert_eq!(w.notifier().sent(), ["A"]);

        let saved = store.inner.snapshot().await.unwrap();
        let en = Region::new("en-us").unwrap();
        assert!(saved.contains(&en, "a"));
        assert!(!saved.contains(&en, "b"));
        assert!(saved.get(&Region::new("ko-kr").unwrap()).is_none());
        assert_eq!(*store.saves.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_lets_running_pass_save() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let source = FakeSource {
            gate: Some((entered.clone(), release.clone())),
            ..Default::default()
        };
        source.set("en-us", vec![post("a", "A")]);
        let store = Arc::new(MemoryStateStore::new());
        let w = Arc::new(watcher(source, FakeNotifier::default(), store.clone(), &["en-us"]));

        let running = tokio::spawn({
            let w = Arc::clone(&w);
            async move { w.run_pass().await }
        });
        entered.notified().await;

        let idle = tokio::spawn({
            let w = Arc::clone(&w);
            async move { w.wait_idle().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!idle.is_finished());

        release.notify_one();
        idle.await.unwrap();

        let saved = store.snapshot().await.unwrap();
        assert!(saved.contains(&Region::new("en-us").unwrap(), "a"));
        assert!(matches!(running.await.unwrap().unwrap(), PassOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_with_notifier_needs_no_discord_config() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.file_path = tmp.path().join("news_state.json").display().to_string();

        assert!(matches!(
            LiveWatcher::from_config(&config).await,
            Err(AppError::MissingDestination(_))
        ));

        let w = NewsWatcher::with_notifier(&config, LogNotifier).await.unwrap();
        assert_eq!(w.regions().len(), config.regions().unwrap().len());
        assert!(w.store().describe().contains("news_state.json"));
    }

    #[tokio::test]
    async fn test_failed_save_is_written_next_pass() {
        let store = Arc::new(CountingStore::default());
        *store.fail_saves.lock().unwrap() = true;
        let source = FakeSource::with("en-us", vec![post("a", "A")]);
        let w = watcher(source, FakeNotifier::default(), store.clone(), &["en-us"]);

        let report = completed(w.run_pass().await.unwrap());
        assert_eq!(report.delivered, 1);
        assert!(!report.saved);

        *store.fail_saves.lock().unwrap() = false;
        let report = completed(w.run_pass().await.unwrap());
        assert_eq!(report.delivered, 0);
        assert!(report.saved);
        assert_eq!(w.notifier().sent(), ["A"]);
    }

    #[tokio::test]
    async fn test_seed_marks_without_notifying() {
        let store = Arc::new(MemoryStateStore::new());
        let source = FakeSource::with("en-us", vec![post("a", "A"), post("b", "B")]);
        let w = watcher(source, FakeNotifier::default(), store.clone(), &["en-us", "ko-kr"]);

        let report = completed(w.seed_pass().await.unwrap());
        assert_eq!(report.posts_seen, 2);
        assert!(report.saved);
        assert!(w.notifier().sent().is_empty());

        assert_eq!(completed(w.run_pass().await.unwrap()).delivered, 0);
    }

    /// Serves back whatever the last contents PUT wrote.
    #[derive(Clone, Default)]
    struct ContentsMirror {
        content: Arc<StdMutex<Option<String>>>,
    }

    impl Respond for ContentsMirror {
        fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
            let mut content = self.content.lock().unwrap();
            if request.method.to_string() == "PUT" {
                let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
                *content = body["content"].as_str().map(str::to_string);
                return ResponseTemplate::new(200)
                    .set_body_json(json!({ "content": { "sha": "blob" } }));
            }
            match content.as_ref() {
                Some(encoded) => ResponseTemplate::new(200)
                    .set_body_json(json!({ "sha": "blob", "content": encoded })),
                None => ResponseTemplate::new(404),
            }
        }
    }

    #[tokio::test]
    async fn test_backends_yield_same_state() {
        let tmp = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let mirror = ContentsMirror::default();
        Mock::given(path("/repos/acme/bot/contents/news_state.json"))
            .respond_with(mirror.clone())
            .mount(&server)
            .await;

        let stores: Vec<Arc<dyn StateStore>> = vec![
            Arc::new(MemoryStateStore::new()),
            Arc::new(FileStateStore::new(tmp.path().join("news_state.json"))),
            Arc::new(GithubStateStore::new(
                create_api_client(5).unwrap(),
                server.uri(),
                "acme/bot",
                "news_state.json",
                "main",
                "ghp_test",
            )),
        ];

        let mut results = Vec::new();
        for store in stores {
            let source = FakeSource::with("en-us", vec![post("a", "A")]);
            source.set("pt-br", vec![post("x", "X"), post("y", "Y")]);
            let w = watcher(source, FakeNotifier::default(), store.clone(), &["en-us", "pt-br"]);

            completed(w.run_pass().await.unwrap());
            w.source.set("en-us", vec![post("b", "B"), post("a", "A")]);
            completed(w.run_pass().await.unwrap());

            results.push(store.load().await.unwrap());
        }

        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
        assert_eq!(results[0].total_count(), 4);

        // The remote copy is the base64 of the same document.
        let encoded = mirror.content.lock().unwrap().clone().unwrap();
        let remote: SeenState =
            serde_json::from_slice(&general_purpose::STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(remote, results[1]);
    }

    #[tokio::test]
    async fn test_heartbeat_uses_plain_text() {
        let w = watcher(
            FakeSource::default(),
            FakeNotifier::default(),
            Arc::new(MemoryStateStore::new()),
            &["en-us", "ko-kr"],
        );
        w.heartbeat().await.unwrap();
        assert!(w.notifier().sent()[0].starts_with("Still watching 2 regions"));
    }
}
