//! # Flagstore Files
//!
//! A data source that reads flag data from local JSON or YAML files and
//! writes it into a [`FeatureStore`](flagstore_store::FeatureStore).
//!
//! Every load replaces the store's contents with the union of all files.
//! With auto-update enabled, the containing directories are watched and the
//! files are reloaded after any change to one of them settles.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flagstore_files::{DataSource, FileDataSource, FileDataSourceConfig};
//! use flagstore_store::MemoryStore;
//!
//! async fn example() {
//!     let store = Arc::new(MemoryStore::new());
//!     let source = FileDataSource::new(
//!         store,
//!         ["flags.yaml", "segments.json"],
//!         FileDataSourceConfig::new().with_auto_update(true),
//!     );
//!     source.start().await;
//!     assert!(source.initialized());
//!     source.close().await;
//! }
//! ```

pub mod error;
pub mod loader;
pub mod parse;
pub mod source;
pub mod watcher;

pub use error::{LoadError, Result, WatchError};
pub use loader::DataLoader;
pub use parse::{FileData, DEFAULT_ITEM_VERSION};
pub use source::{
    DataSource, FileDataSource, FileDataSourceConfig, ReloadOutcome, SourceState,
    DEFAULT_DEBOUNCE,
};
pub use watcher::FileWatcher;
