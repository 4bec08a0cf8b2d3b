//! # Flagstore Store
//!
//! Storage abstraction for flag data. Provides a trait-based interface for
//! versioned item persistence with SQLite and in-memory implementations, and
//! a caching decorator that composes with either.
//!
//! ## Key Types
//!
//! - [`FeatureStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based store, shareable across processes
//! - [`MemoryStore`] - In-memory store over a shared [`MemoryDatabase`]
//! - [`CachingStore`] - TTL-based read-through/write-through cache
//! - [`KeyPrefix`] - Namespacing so several stores can share one backend
//! - [`UpsertResult`] - Outcome of a conditional write
//!
//! ## Usage
//!
//! ```rust,no_run
//! use flagstore_core::{DataBuilder, Item, FEATURES};
//! use flagstore_store::{CacheConfig, CachingStore, FeatureStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("flags.db", Some("my-app")).unwrap();
//!     let store = CachingStore::new(store, CacheConfig::default());
//!
//!     let data = DataBuilder::new()
//!         .add(FEATURES, Item::new("new-checkout", 1, serde_json::json!({ "on": true })))
//!         .build();
//!     store.init(data).await.unwrap();
//!
//!     let flag = store.get(FEATURES, "new-checkout").await.unwrap();
//!     assert!(flag.is_some());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Highest version wins**: an upsert only applies over a strictly lower
//!   stored version; ties and lower versions are `Superseded`, not errors
//! - **Atomic comparison**: backends compare and write in one step
//! - **Tombstones**: deletions keep their version to reject stale writes
//! - **Init latch**: once initialized, a backend+prefix stays initialized

pub mod caching;
pub mod error;
pub mod memory;
pub mod migration;
pub mod prefix;
pub mod sqlite;
pub mod traits;

pub use caching::{CacheConfig, CacheMode, CacheStats, CachingStore, DEFAULT_CACHE_TTL};
pub use error::{Result, StoreError};
pub use memory::{MemoryDatabase, MemoryStore};
pub use prefix::{KeyPrefix, DEFAULT_PREFIX};
pub use sqlite::SqliteStore;
pub use traits::{FeatureStore, FeatureStoreExt, UpdateHook, UpsertResult};
