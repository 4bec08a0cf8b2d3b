//! # Flagstore
//!
//! A versioned store for feature flag data.
//!
//! ## Overview
//!
//! - **Items**: flags and segments, each with a key and a version
//! - **Stores**: SQLite and in-memory backends that agree on one rule,
//!   the highest version wins, however many handles write concurrently
//! - **Caching**: a read-through, write-through decorator for any store
//! - **File data source**: loads JSON or YAML data files into a store and
//!   reloads them when they change
//!
//! ## Usage
//!
//! ```rust,no_run
//! use flagstore::{
//!     open_store, BackendConfig, DataSource, FeatureStore, FileDataSource, FileDataSourceConfig,
//!     StoreConfig,
//! };
//!
//! async fn example() {
//!     let store = open_store(StoreConfig::new(BackendConfig::Sqlite("flags.db".into()))).unwrap();
//!
//!     let source = FileDataSource::new(
//!         store.clone(),
//!         ["flags.yaml"],
//!         FileDataSourceConfig::new().with_auto_update(true),
//!     );
//!     source.start().await;
//!
//!     let flag = store.get(flagstore::FEATURES, "new-checkout").await.unwrap();
//!     println!("{flag:?}");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `flagstore::core` - Items, kinds, and data sets
//! - `flagstore::store` - The store trait, backends, and cache
//! - `flagstore::files` - The file data source

pub mod config;
pub mod error;

// Re-export component crates
pub use flagstore_core as core;
pub use flagstore_files as files;
pub use flagstore_store as store;

pub use config::{open_store, BackendConfig, StoreConfig};
pub use error::{FlagstoreError, Result};

// Re-export commonly used types
pub use flagstore_core::{DataBuilder, DataKind, FullDataSet, Item, ItemBuilder, FEATURES, SEGMENTS};
pub use flagstore_files::{DataSource, FileDataSource, FileDataSourceConfig, ReloadOutcome};
pub use flagstore_store::{
    CacheConfig, CachingStore, FeatureStore, FeatureStoreExt, MemoryDatabase, MemoryStore,
    SqliteStore, UpsertResult,
};
