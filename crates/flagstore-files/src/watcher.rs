//! Watches data files for changes.
//!
//! Most platforms only notify at directory granularity, so the watcher
//! registers each distinct parent directory and then filters events down to
//! the files that were actually requested. Paths are resolved to absolute
//! form up front so event paths can be compared by set membership.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::WatchError;

/// A live directory watch over a fixed set of files.
///
/// Dropping the watcher stops the platform watch.
pub struct FileWatcher {
    // Held so the platform watch stays registered.
    _watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
    directories: Vec<PathBuf>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl FileWatcher {
    /// Start watching the directories containing `files`.
    pub fn create<P: AsRef<Path>>(files: impl IntoIterator<Item = P>) -> Result<Self, WatchError> {
        let mut watched = HashSet::new();
        let mut directories = BTreeSet::new();
        for file in files {
            let resolved = resolve(file.as_ref())?;
            if let Some(parent) = resolved.parent() {
                directories.insert(parent.to_path_buf());
            }
            watched.insert(resolved);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // Receiver gone means the watcher is shutting down.
                let _ = tx.send(event);
            }
            Err(e) => tracing::warn!("file watcher error: {}", e),
        })?;

        for dir in &directories {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        Ok(Self {
            _watcher: watcher,
            watched,
            directories: directories.into_iter().collect(),
            events: rx,
        })
    }

    /// Absolute paths of the watched files.
    pub fn watched_files(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    /// Directories registered with the platform watcher.
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Whether `event` concerns one of the watched files.
    pub fn is_relevant(&self, event: &Event) -> bool {
        is_relevant(event, &self.watched)
    }

    /// Wait for the next batch of events.
    ///
    /// Blocks until at least one event arrives, then also takes every event
    /// already queued. Returns `None` once the platform watcher has stopped.
    pub async fn next_batch(&mut self) -> Option<Vec<Event>> {
        let first = self.events.recv().await?;
        let mut batch = vec![first];
        batch.extend(self.drain());
        Some(batch)
    }

    /// Take every queued event without waiting.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// An event is relevant when it creates, modifies or removes a watched file.
///
/// Events for other files in a watched directory are ignored.
pub fn is_relevant(event: &Event, watched: &HashSet<PathBuf>) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| watched.contains(p))
}

/// Resolve `path` to an absolute path with a canonical parent directory.
///
/// The file itself need not exist, but its directory must.
pub fn resolve(path: &Path) -> Result<PathBuf, WatchError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| WatchError::Resolve {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    let (parent, name) = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => (parent, name),
        _ => return Err(WatchError::NoParentDirectory(path.to_path_buf())),
    };

    let parent = parent.canonicalize().map_err(|source| WatchError::Resolve {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parent.join(name))
}
