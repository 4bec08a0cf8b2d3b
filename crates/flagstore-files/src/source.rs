//! The file data source: loads data files into a store at startup and,
//! optionally, whenever the files change.
//!
//! Reload failures never propagate. A bad edit to a watched file is logged
//! and the store keeps serving the last snapshot that loaded cleanly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flagstore_store::FeatureStore;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::loader::DataLoader;
use crate::watcher::FileWatcher;

/// Default quiet period between a file change and the reload it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

const OUTCOME_CHANNEL_CAPACITY: usize = 16;

/// A producer of store data.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Make the first attempt to populate the store.
    ///
    /// Returning signals that the attempt was made, not that it succeeded.
    async fn start(&self);

    /// Whether the store has been populated at least once.
    fn initialized(&self) -> bool;

    /// Stop producing data. Idempotent.
    async fn close(&self);
}

/// Configuration for [`FileDataSource`].
#[derive(Debug, Clone)]
pub struct FileDataSourceConfig {
    /// Reload whenever a data file changes.
    pub auto_update: bool,
    /// Quiet period after a change before reloading, so a burst of writes
    /// produces one reload.
    pub debounce: Duration,
}

impl Default for FileDataSourceConfig {
    fn default() -> Self {
        Self {
            auto_update: false,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl FileDataSourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_update(mut self, enabled: bool) -> Self {
        self.auto_update = enabled;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Result of one reload attempt, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The files loaded and the store was initialized with `items` items.
    Loaded { items: usize },
    /// Loading or storing failed; the previous data is still in place.
    Failed { error: String },
}

/// Lifecycle of a [`FileDataSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Stopped,
    Starting,
    Running,
    Closed,
}

/// Loads the files and initializes the store. Shared with the watch task.
struct Reloader<S: ?Sized> {
    store: Arc<S>,
    loader: Arc<DataLoader>,
    inited: Arc<AtomicBool>,
    outcomes: broadcast::Sender<ReloadOutcome>,
}

impl<S: ?Sized> Clone for Reloader<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            loader: self.loader.clone(),
            inited: self.inited.clone(),
            outcomes: self.outcomes.clone(),
        }
    }
}

impl<S: FeatureStore + ?Sized> Reloader<S> {
    async fn reload(&self) -> bool {
        let outcome = self.try_reload().await;
        let loaded = matches!(outcome, ReloadOutcome::Loaded { .. });
        // No subscribers is fine.
        let _ = self.outcomes.send(outcome);
        loaded
    }

    async fn try_reload(&self) -> ReloadOutcome {
        let loader = self.loader.clone();
        let data = match tokio::task::spawn_blocking(move || loader.load()).await {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                tracing::error!("failed to load flag data files: {}", e);
                return ReloadOutcome::Failed {
                    error: e.to_string(),
                };
            }
            Err(e) => {
                tracing::error!("flag data load task failed: {}", e);
                return ReloadOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let items = data.item_count();
        if let Err(e) = self.store.init(data).await {
            tracing::error!("failed to store flag data loaded from files: {}", e);
            return ReloadOutcome::Failed {
                error: e.to_string(),
            };
        }

        self.inited.store(true, Ordering::Release);
        tracing::info!(items, "loaded flag data from files");
        ReloadOutcome::Loaded { items }
    }
}

struct WatchTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Takes flag data from files and puts it into a store.
pub struct FileDataSource<S: FeatureStore + ?Sized + 'static> {
    reloader: Reloader<S>,
    config: FileDataSourceConfig,
    state: Mutex<SourceState>,
    watch_task: Mutex<Option<WatchTask>>,
}

impl<S: FeatureStore + ?Sized + 'static> FileDataSource<S> {
    pub fn new<P: Into<PathBuf>>(
        store: Arc<S>,
        files: impl IntoIterator<Item = P>,
        config: FileDataSourceConfig,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            reloader: Reloader {
                store,
                loader: Arc::new(DataLoader::new(files)),
                inited: Arc::new(AtomicBool::new(false)),
                outcomes,
            },
            config,
            state: Mutex::new(SourceState::Stopped),
            watch_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FileDataSourceConfig {
        &self.config
    }

    pub fn files(&self) -> &[PathBuf] {
        self.reloader.loader.files()
    }

    pub fn state(&self) -> SourceState {
        *self.state.lock().unwrap()
    }

    /// Receive the outcome of every reload attempt made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadOutcome> {
        self.reloader.outcomes.subscribe()
    }

    /// Load the files now, outside of any watch event.
    pub async fn reload(&self) -> bool {
        self.reloader.reload().await
    }

    fn spawn_watcher(&self) -> Option<WatchTask> {
        let watcher = match FileWatcher::create(self.files()) {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::error!("unable to watch files for auto-updating: {}", e);
                return None;
            }
        };
        tracing::info!(directories = ?watcher.directories(), "watching flag data files");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(watch_loop(
            watcher,
            self.reloader.clone(),
            self.config.debounce,
            shutdown_rx,
        ));
        Some(WatchTask { shutdown, handle })
    }
}

#[async_trait]
impl<S: FeatureStore + ?Sized + 'static> DataSource for FileDataSource<S> {
    async fn start(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != SourceState::Stopped {
                tracing::warn!(state = ?*state, "file data source already started");
                return;
            }
            *state = SourceState::Starting;
        }

        // A failed initial load still starts the watcher: a later edit may fix the files.
        self.reloader.reload().await;

        let task = if self.config.auto_update {
            self.spawn_watcher()
        } else {
            None
        };

        let mut state = self.state.lock().unwrap();
        if *state == SourceState::Closed {
            // Closed while starting.
            if let Some(task) = task {
                let _ = task.shutdown.send(true);
            }
            return;
        }
        *self.watch_task.lock().unwrap() = task;
        *state = SourceState::Running;
    }

    fn initialized(&self) -> bool {
        self.reloader.inited.load(Ordering::Acquire)
    }

    async fn close(&self) {
        *self.state.lock().unwrap() = SourceState::Closed;

        let task = self.watch_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                tracing::warn!("file watcher task ended abnormally: {}", e);
            }
        }
    }
}

/// Waits for file events and reloads when a watched file changed.
///
/// Runs until shutdown is signalled or the platform watcher stops. Reloads
/// run one at a time on this task; events queued during the debounce
/// interval collapse into the pending reload.
async fn watch_loop<S: FeatureStore + ?Sized>(
    mut watcher: FileWatcher,
    reloader: Reloader<S>,
    debounce: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let batch = tokio::select! {
            _ = shutdown.changed() => break,
            batch = watcher.next_batch() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        if !batch.iter().any(|event| watcher.is_relevant(event)) {
            continue;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(debounce) => {}
        }
        watcher.drain();

        reloader.reload().await;
    }
    tracing::debug!("file watcher stopped");
}
