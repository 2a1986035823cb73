//! Application context: owns the shared pipeline state and task lifecycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use numcast_common::config::AppConfig;
use numcast_notifier::dispatcher::Dispatcher;
use numcast_store::DataStore;
use numcast_store::mirror::join_path;

use crate::clock::Clock;
use crate::dedup::DedupCache;
use crate::discovery::run_discovery;

/// Engine tunables, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tracked_root: String,
    pub dedup_window: Duration,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            tracked_root: config.tracked_root.clone(),
            dedup_window: Duration::from_millis(config.dedup_window_ms),
        }
    }
}

struct PipelineInner {
    store: Arc<dyn DataStore>,
    dispatcher: Arc<Dispatcher>,
    dedup: DedupCache,
    clock: Arc<dyn Clock>,
    tracked_root: String,
    attached: Mutex<HashSet<String>>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

/// Shared handle passed to discovery and every watcher task.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.inner.store
    }

    pub fn tracked_root(&self) -> &str {
        &self.inner.tracked_root
    }

    pub fn today(&self) -> String {
        self.inner.clock.today()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn game_path(&self, game: &str) -> String {
        join_path(&self.inner.tracked_root, game)
    }

    /// Spawn a task tied to the context's lifetime.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.spawn(future);
    }

    /// Record `game` as watched. Returns `false` if it already was.
    pub async fn mark_attached(&self, game: &str) -> bool {
        self.inner.attached.lock().await.insert(game.to_string())
    }

    pub async fn attached_games(&self) -> Vec<String> {
        let mut games: Vec<String> = self.inner.attached.lock().await.iter().cloned().collect();
        games.sort();
        games
    }

    /// Gate a candidate through the dedup cache and, if it passes, dispatch
    /// it in the background. Dispatch failures are logged, never returned.
    pub async fn notify(&self, game: &str, date: &str, number: &str) {
        if !self.inner.dedup.should_send(game, date, number).await {
            return;
        }

        tracing::info!(game, date, number, "New number for today, notifying subscribers");

        let dispatcher = self.inner.dispatcher.clone();
        let (game, date, number) = (game.to_string(), date.to_string(), number.to_string());
        self.spawn(async move {
            if let Err(e) = dispatcher
                .send_number_notification(&game, &date, &number)
                .await
            {
                tracing::error!(
                    game = %game,
                    date = %date,
                    number = %number,
                    error = %e,
                    "Dropping notification, subscriber read failed"
                );
            }
        });
    }
}

/// Lifecycle owner for discovery, watchers and in-flight dispatches.
pub struct NotifierContext {
    pipeline: Pipeline,
}

impl NotifierContext {
    pub fn new(
        store: Arc<dyn DataStore>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                inner: Arc::new(PipelineInner {
                    store,
                    dispatcher,
                    dedup: DedupCache::new(settings.dedup_window),
                    clock,
                    tracked_root: settings.tracked_root,
                    attached: Mutex::new(HashSet::new()),
                    tasks: TaskTracker::new(),
                    cancel: CancellationToken::new(),
                }),
            },
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Begin discovering games and attaching watchers.
    pub fn start(&self) {
        tracing::info!(tracked_root = %self.pipeline.tracked_root(), "Starting game discovery");
        self.pipeline.spawn(run_discovery(self.pipeline.clone()));
    }

    /// Games with watchers attached, sorted.
    pub async fn watched_games(&self) -> Vec<String> {
        self.pipeline.attached_games().await
    }

    /// Stop every watcher and wait for in-flight dispatches to finish.
    pub async fn shutdown(&self) {
        self.pipeline.inner.cancel.cancel();
        self.pipeline.inner.tasks.close();
        self.pipeline.inner.tasks.wait().await;
        tracing::info!("Notifier stopped");
    }
}
