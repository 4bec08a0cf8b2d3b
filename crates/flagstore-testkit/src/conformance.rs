//! Behavioral conformance suite shared by every store backend.
//!
//! A backend plugs in through [`StoreFactory`]; [`StoreSuite`] runs each
//! check against it, optionally through a [`CachingStore`]. Use
//! [`store_conformance_tests!`](crate::store_conformance_tests) to expand
//! the suite into `#[tokio::test]` functions.
//!
//! Checks panic on failure, like any test body.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flagstore_core::{DataBuilder, DataKind, FullDataSet, Item, FEATURES, SEGMENTS};
use flagstore_store::{
    CacheConfig, CachingStore, FeatureStore, FeatureStoreExt, MemoryDatabase, MemoryStore,
    SqliteStore, StoreError, UpdateHook, UpsertResult,
};
use tempfile::TempDir;

use crate::fixtures::{flag, segment};

/// Opens store handles that share one physical backend.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Open a new handle. Handles opened with the same prefix see the same data.
    fn open(&self, prefix: Option<&str>, hook: Option<UpdateHook>) -> Arc<dyn FeatureStore>;

    /// Remove all data under every prefix.
    async fn clear_all(&self);

    /// Whether the backend honors key prefixes.
    fn supports_prefix(&self) -> bool {
        true
    }
}

/// Handles over one shared [`MemoryDatabase`].
pub struct MemoryFactory {
    db: Arc<MemoryDatabase>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self {
            db: MemoryDatabase::new(),
        }
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreFactory for MemoryFactory {
    fn open(&self, prefix: Option<&str>, hook: Option<UpdateHook>) -> Arc<dyn FeatureStore> {
        let store = MemoryStore::open(self.db.clone(), prefix);
        match hook {
            Some(hook) => Arc::new(store.with_update_hook(hook)),
            None => Arc::new(store),
        }
    }

    async fn clear_all(&self) {
        self.db.clear();
    }
}

/// Handles over one SQLite file in a temporary directory.
pub struct SqliteFactory {
    _dir: TempDir,
    path: PathBuf,
}

impl SqliteFactory {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("flags.db");
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Default for SqliteFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreFactory for SqliteFactory {
    fn open(&self, prefix: Option<&str>, hook: Option<UpdateHook>) -> Arc<dyn FeatureStore> {
        let store = SqliteStore::open(&self.path, prefix).expect("failed to open sqlite store");
        match hook {
            Some(hook) => Arc::new(store.with_update_hook(hook)),
            None => Arc::new(store),
        }
    }

    async fn clear_all(&self) {
        let store = SqliteStore::open(&self.path, None).expect("failed to open sqlite store");
        store.clear_all().await.expect("failed to clear sqlite store");
        store.close().await.expect("failed to close sqlite store");
    }
}

/// A hook that writes `items` in order through `store` the first time it runs.
pub fn competing_upserts(
    store: Arc<dyn FeatureStore>,
    kind: DataKind,
    items: Vec<Item>,
) -> UpdateHook {
    let fired = Arc::new(AtomicBool::new(false));
    Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let store = store.clone();
        let items = items.clone();
        let fired = fired.clone();
        Box::pin(async move {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
            for item in items {
                store
                    .upsert(kind, item)
                    .await
                    .expect("competing upsert failed");
            }
        })
    })
}

/// The conformance checks, run against one factory and cache configuration.
pub struct StoreSuite<F> {
    factory: F,
    cache: CacheConfig,
}

impl<F: StoreFactory> StoreSuite<F> {
    pub fn new(factory: F, cache: CacheConfig) -> Self {
        Self { factory, cache }
    }

    /// Open a handle, wrapped in a cache when the suite is cached.
    pub fn open(&self, prefix: Option<&str>, hook: Option<UpdateHook>) -> Arc<dyn FeatureStore> {
        let store = self.factory.open(prefix, hook);
        if self.cache.is_enabled() {
            Arc::new(CachingStore::new(store, self.cache))
        } else {
            store
        }
    }

    async fn fresh_store(&self) -> Arc<dyn FeatureStore> {
        self.factory.clear_all().await;
        self.open(None, None)
    }

    fn base_data() -> FullDataSet {
        DataBuilder::new()
            .add(FEATURES, flag("foo", 10))
            .add(FEATURES, flag("bar", 10))
            .add(SEGMENTS, segment("seg", 10, &["u1"]))
            .build()
    }

    pub async fn test_not_initialized_before_init(&self) {
        let store = self.fresh_store().await;
        assert!(!store.initialized().await.unwrap());
    }

    pub async fn test_initialized_after_empty_init(&self) {
        let store = self.fresh_store().await;
        store.init(FullDataSet::empty()).await.unwrap();
        assert!(store.initialized().await.unwrap());
    }

    /// Another handle's init is visible. Only meaningful without a cache,
    /// since a cached handle may hold a "not initialized" answer.
    pub async fn test_init_visible_to_other_handles(&self) {
        if self.cache.is_enabled() {
            return;
        }
        let store1 = self.fresh_store().await;
        let store2 = self.open(None, None);

        assert!(!store1.initialized().await.unwrap());
        assert!(!store2.initialized().await.unwrap());

        store2.init(FullDataSet::empty()).await.unwrap();
        assert!(store1.initialized().await.unwrap());
    }

    pub async fn test_get_and_all_after_init(&self) {
        let store = self.fresh_store().await;
        store.init(Self::base_data()).await.unwrap();

        let foo = store.get(FEATURES, "foo").await.unwrap().unwrap();
        assert_eq!(foo.version(), 10);
        assert_eq!(foo.data()["key"], "foo");
        assert!(store.get(FEATURES, "missing").await.unwrap().is_none());
        assert!(store.get(SEGMENTS, "foo").await.unwrap().is_none());

        let flags = store.all(FEATURES).await.unwrap();
        assert_eq!(flags.len(), 2);
        assert!(flags.contains_key("foo") && flags.contains_key("bar"));
        assert_eq!(store.all(SEGMENTS).await.unwrap().len(), 1);
    }

    pub async fn test_init_replaces_previous_data(&self) {
        let store = self.fresh_store().await;
        store.init(Self::base_data()).await.unwrap();

        let replacement = DataBuilder::new().add(FEATURES, flag("baz", 1)).build();
        store.init(replacement).await.unwrap();

        assert!(store.get(FEATURES, "foo").await.unwrap().is_none());
        assert!(store.get(FEATURES, "baz").await.unwrap().is_some());
        assert!(store.all(SEGMENTS).await.unwrap().is_empty());
    }

    pub async fn test_upsert_respects_versions(&self) {
        let store = self.fresh_store().await;
        store.init(Self::base_data()).await.unwrap();

        assert_eq!(
            store.upsert(FEATURES, flag("foo", 11)).await.unwrap(),
            UpsertResult::Applied
        );
        assert_eq!(
            store.upsert(FEATURES, flag("foo", 9)).await.unwrap(),
            UpsertResult::Superseded
        );
        assert_eq!(
            store.upsert(FEATURES, flag("foo", 11)).await.unwrap(),
            UpsertResult::Superseded
        );
        assert_eq!(store.get(FEATURES, "foo").await.unwrap().unwrap().version(), 11);

        assert_eq!(
            store.upsert(FEATURES, flag("new", 1)).await.unwrap(),
            UpsertResult::Applied
        );
        assert_eq!(store.all(FEATURES).await.unwrap().len(), 3);
    }

    pub async fn test_delete_keeps_tombstone(&self) {
        let store = self.fresh_store().await;
        store.init(Self::base_data()).await.unwrap();

        assert!(store.delete(FEATURES, "foo", 11).await.unwrap().is_applied());
        assert!(store.get(FEATURES, "foo").await.unwrap().is_none());
        assert!(!store.all(FEATURES).await.unwrap().contains_key("foo"));

        // Stale writes cannot resurrect it.
        assert_eq!(
            store.upsert(FEATURES, flag("foo", 10)).await.unwrap(),
            UpsertResult::Superseded
        );
        assert!(store.get(FEATURES, "foo").await.unwrap().is_none());

        assert!(store.upsert(FEATURES, flag("foo", 12)).await.unwrap().is_applied());
        assert!(store.get(FEATURES, "foo").await.unwrap().is_some());
    }

    /// A competing writer stores several versions between the stored one and ours.
    pub async fn test_race_with_lower_version(&self) {
        self.factory.clear_all().await;
        let competitor = self.factory.open(None, None);
        competitor
            .init(DataBuilder::new().add(FEATURES, flag("foo", 1)).build())
            .await
            .unwrap();

        let hook = competing_upserts(
            competitor.clone(),
            FEATURES,
            vec![flag("foo", 2), flag("foo", 3), flag("foo", 4)],
        );
        let store = self.open(None, Some(hook));

        assert_eq!(
            store.upsert(FEATURES, flag("foo", 10)).await.unwrap(),
            UpsertResult::Applied
        );
        assert_eq!(store.get(FEATURES, "foo").await.unwrap().unwrap().version(), 10);
        assert_eq!(competitor.get(FEATURES, "foo").await.unwrap().unwrap().version(), 10);
    }

    /// A competing writer stores a higher version than ours.
    pub async fn test_race_with_higher_version(&self) {
        self.factory.clear_all().await;
        let competitor = self.factory.open(None, None);
        competitor
            .init(DataBuilder::new().add(FEATURES, flag("foo", 1)).build())
            .await
            .unwrap();

        let hook = competing_upserts(competitor.clone(), FEATURES, vec![flag("foo", 3)]);
        let store = self.open(None, Some(hook));

        assert_eq!(
            store.upsert(FEATURES, flag("foo", 2)).await.unwrap(),
            UpsertResult::Superseded
        );
        assert_eq!(store.get(FEATURES, "foo").await.unwrap().unwrap().version(), 3);
        assert_eq!(competitor.get(FEATURES, "foo").await.unwrap().unwrap().version(), 3);
    }

    /// Stores with different prefixes on one backend do not interfere.
    pub async fn test_prefixes_are_independent(&self) {
        if !self.factory.supports_prefix() {
            return;
        }
        self.factory.clear_all().await;
        let store1 = self.open(Some("aaa"), None);
        let store2 = self.open(Some("bbb"), None);

        assert!(!store1.initialized().await.unwrap());
        assert!(!store2.initialized().await.unwrap());

        store1
            .init(
                DataBuilder::new()
                    .add(FEATURES, flag("flag-a", 1))
                    .add(FEATURES, flag("flag-c", 1))
                    .build(),
            )
            .await
            .unwrap();
        assert!(store1.initialized().await.unwrap());
        assert!(!store2.initialized().await.unwrap());

        store2
            .init(
                DataBuilder::new()
                    .add(FEATURES, flag("flag-b", 1))
                    .add(FEATURES, flag("flag-c", 2))
                    .build(),
            )
            .await
            .unwrap();

        let flags1 = store1.all(FEATURES).await.unwrap();
        let flags2 = store2.all(FEATURES).await.unwrap();
        assert_eq!(flags1.len(), 2);
        assert_eq!(flags2.len(), 2);
        assert!(flags1.contains_key("flag-a") && !flags1.contains_key("flag-b"));
        assert!(flags2.contains_key("flag-b") && !flags2.contains_key("flag-a"));
        assert_eq!(flags1["flag-c"].version(), 1);
        assert_eq!(flags2["flag-c"].version(), 2);
    }

    pub async fn test_closed_store_rejects_operations(&self) {
        let store = self.fresh_store().await;
        store.init(Self::base_data()).await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(
            store.get(FEATURES, "foo").await,
            Err(StoreError::Closed)
        ));
        assert!(matches!(
            store.upsert(FEATURES, flag("other", 1)).await,
            Err(StoreError::Closed)
        ));
    }

    /// Run every check.
    pub async fn run_all(&self) {
        self.test_not_initialized_before_init().await;
        self.test_initialized_after_empty_init().await;
        self.test_init_visible_to_other_handles().await;
        self.test_get_and_all_after_init().await;
        self.test_init_replaces_previous_data().await;
        self.test_upsert_respects_versions().await;
        self.test_delete_keeps_tombstone().await;
        self.test_race_with_lower_version().await;
        self.test_race_with_higher_version().await;
        self.test_prefixes_are_independent().await;
        self.test_closed_store_rejects_operations().await;
    }
}

/// Expand the conformance suite into one `#[tokio::test]` per check.
///
/// ```rust,ignore
/// flagstore_testkit::store_conformance_tests!(
///     memory_uncached,
///     flagstore_testkit::MemoryFactory::new(),
///     flagstore_store::CacheConfig::disabled()
/// );
/// ```
#[macro_export]
macro_rules! store_conformance_tests {
    ($name:ident, $factory:expr, $cache:expr) => {
        mod $name {
            #[allow(unused_imports)]
            use super::*;

            fn suite() -> $crate::conformance::StoreSuite<impl $crate::conformance::StoreFactory> {
                $crate::conformance::StoreSuite::new($factory, $cache)
            }

            $crate::store_conformance_tests!(@tests
                test_not_initialized_before_init,
                test_initialized_after_empty_init,
                test_init_visible_to_other_handles,
                test_get_and_all_after_init,
                test_init_replaces_previous_data,
                test_upsert_respects_versions,
                test_delete_keeps_tombstone,
                test_race_with_lower_version,
                test_race_with_higher_version,
                test_prefixes_are_independent,
                test_closed_store_rejects_operations
            );
        }
    };
    (@tests $($check:ident),*) => {
        $(
            #[tokio::test]
            async fn $check() {
                suite().$check().await;
            }
        )*
    };
}
