//! Read-through, write-through caching decorator for any [`FeatureStore`].
//!
//! The cache is private to one handle. The wrapped backend stays the arbiter
//! for conflicting writes: `upsert` always goes to the backend, and the cache
//! only ever records the backend's resulting value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flagstore_core::{DataKind, FullDataSet, Item};

use crate::error::Result;
use crate::traits::{FeatureStore, UpsertResult};

/// Default entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15);

/// How long cached entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Every call goes to the backend.
    Disabled,
    /// Entries expire after the given duration.
    Ttl(Duration),
    /// Entries never expire; the backend is only read on a miss.
    Forever,
}

/// Configuration for [`CachingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub mode: CacheMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Ttl(DEFAULT_CACHE_TTL),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            mode: CacheMode::Disabled,
        }
    }

    pub fn forever() -> Self {
        Self {
            mode: CacheMode::Forever,
        }
    }

    /// Cache for `ttl`. A zero TTL means cache forever.
    pub fn from_ttl(ttl: Duration) -> Self {
        if ttl.is_zero() {
            Self::forever()
        } else {
            Self {
                mode: CacheMode::Ttl(ttl),
            }
        }
    }

    /// Cache for `secs` seconds. Zero or negative means cache forever.
    pub fn from_ttl_secs(secs: i64) -> Self {
        match u64::try_from(secs) {
            Ok(secs) => Self::from_ttl(Duration::from_secs(secs)),
            Err(_) => Self::forever(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.mode, CacheMode::Disabled)
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self.mode, CacheMode::Forever)
    }

    fn expiry(&self, now: Instant) -> Option<Instant> {
        match self.mode {
            CacheMode::Ttl(ttl) => Some(now + ttl),
            CacheMode::Disabled | CacheMode::Forever => None,
        }
    }
}

/// Hit and miss counters of one [`CachingStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct CacheEntry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T: Clone> CacheEntry<T> {
    fn fresh(&self, now: Instant) -> Option<T> {
        match self.expires_at {
            Some(at) if at <= now => None,
            _ => Some(self.value.clone()),
        }
    }
}

/// Caching decorator implementing the same contract as the store it wraps.
pub struct CachingStore<S> {
    inner: S,
    config: CacheConfig,
    /// Raw stored items (tombstones included); `None` records "absent".
    items: RwLock<HashMap<(DataKind, String), CacheEntry<Option<Item>>>>,
    /// Live items per kind, as returned by `all`.
    all: RwLock<HashMap<DataKind, CacheEntry<HashMap<String, Item>>>>,
    /// When a cached "not initialized" answer expires.
    not_inited_until: Mutex<Option<Instant>>,
    /// Bumped by every write while holding the `items` lock. A read-through
    /// result is only cached if no write completed while it was in flight.
    generation: AtomicU64,
    /// Latched once the store is known to be initialized.
    inited: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: FeatureStore> CachingStore<S> {
    pub fn new(inner: S, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            items: RwLock::new(HashMap::new()),
            all: RwLock::new(HashMap::new()),
            not_inited_until: Mutex::new(None),
            generation: AtomicU64::new(0),
            inited: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn cached_item(&self, kind: DataKind, key: &str) -> Option<Option<Item>> {
        let items = self.items.read().unwrap();
        items
            .get(&(kind, key.to_string()))
            .and_then(|entry| entry.fresh(Instant::now()))
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cache a backend read taken at generation `seen`, unless a write has
    /// landed since.
    fn fill_item(&self, kind: DataKind, key: &str, value: Option<Item>, seen: u64) {
        let expires_at = self.config.expiry(Instant::now());
        let mut items = self.items.write().unwrap();
        if self.generation() != seen {
            tracing::debug!(kind = %kind, key, "discarding read overtaken by a write");
            return;
        }
        items.insert((kind, key.to_string()), CacheEntry { value, expires_at });
    }

    fn fill_all(&self, kind: DataKind, value: HashMap<String, Item>, seen: u64) {
        let expires_at = self.config.expiry(Instant::now());
        let mut all = self.all.write().unwrap();
        if self.generation() != seen {
            tracing::debug!(kind = %kind, "discarding read overtaken by a write");
            return;
        }
        all.insert(kind, CacheEntry { value, expires_at });
    }

    /// Record the outcome of a write. `None` drops the item entry so the
    /// next read goes to the backend.
    fn record_write(&self, kind: DataKind, key: &str, value: Option<Item>) {
        let expires_at = self.config.expiry(Instant::now());
        {
            let mut items = self.items.write().unwrap();
            self.generation.fetch_add(1, Ordering::AcqRel);
            match value {
                Some(item) => {
                    items.insert(
                        (kind, key.to_string()),
                        CacheEntry {
                            value: Some(item),
                            expires_at,
                        },
                    );
                }
                None => {
                    items.remove(&(kind, key.to_string()));
                }
            }
        }
        self.all.write().unwrap().remove(&kind);
    }

    fn reset(&self, data: &FullDataSet) {
        let expires_at = self.config.expiry(Instant::now());
        let mut items = self.items.write().unwrap();
        let mut all = self.all.write().unwrap();
        self.generation.fetch_add(1, Ordering::AcqRel);
        items.clear();
        all.clear();

        for (kind, kind_items) in data {
            for (key, item) in kind_items {
                items.insert(
                    (*kind, key.clone()),
                    CacheEntry {
                        value: Some(item.clone()),
                        expires_at,
                    },
                );
            }
            let live = kind_items
                .iter()
                .filter(|(_, item)| !item.is_deleted())
                .map(|(key, item)| (key.clone(), item.clone()))
                .collect();
            all.insert(
                *kind,
                CacheEntry {
                    value: live,
                    expires_at,
                },
            );
        }
    }
}

#[async_trait]
impl<S: FeatureStore> FeatureStore for CachingStore<S> {
    async fn init(&self, data: FullDataSet) -> Result<()> {
        if !self.config.is_enabled() {
            self.inner.init(data).await?;
            self.inited.store(true, Ordering::Release);
            return Ok(());
        }

        self.inner.init(data.clone()).await?;
        self.reset(&data);
        self.inited.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(&self, kind: DataKind, key: &str) -> Result<Option<Item>> {
        if !self.config.is_enabled() {
            return self.inner.get(kind, key).await;
        }

        if let Some(cached) = self.cached_item(kind, key) {
            self.record(true);
            return Ok(cached.filter(|item| !item.is_deleted()));
        }

        self.record(false);
        tracing::debug!(kind = %kind, key, "cache miss");
        let seen = self.generation();
        let item = self.inner.get(kind, key).await?;
        self.fill_item(kind, key, item.clone(), seen);
        Ok(item)
    }

    async fn all(&self, kind: DataKind) -> Result<HashMap<String, Item>> {
        if !self.config.is_enabled() {
            return self.inner.all(kind).await;
        }

        let cached = {
            let all = self.all.read().unwrap();
            all.get(&kind).and_then(|entry| entry.fresh(Instant::now()))
        };
        if let Some(items) = cached {
            self.record(true);
            return Ok(items);
        }

        self.record(false);
        let seen = self.generation();
        let items = self.inner.all(kind).await?;
        self.fill_all(kind, items.clone(), seen);
        Ok(items)
    }

    async fn upsert(&self, kind: DataKind, item: Item) -> Result<UpsertResult> {
        if !self.config.is_enabled() {
            return self.inner.upsert(kind, item).await;
        }

        let key = item.key().to_string();
        let result = self.inner.upsert(kind, item.clone()).await?;

        match result {
            UpsertResult::Applied => self.record_write(kind, &key, Some(item)),
            UpsertResult::Superseded => {
                // Someone else's write won. Drop what we hold before asking the
                // backend, so a failed re-read leaves nothing stale behind.
                self.record_write(kind, &key, None);
                let seen = self.generation();
                let current = self.inner.get(kind, &key).await?;
                self.fill_item(kind, &key, current, seen);
            }
        }

        Ok(result)
    }

    async fn initialized(&self) -> Result<bool> {
        if self.inited.load(Ordering::Acquire) {
            return Ok(true);
        }

        if let CacheMode::Ttl(_) = self.config.mode {
            let until = *self.not_inited_until.lock().unwrap();
            if until.is_some_and(|at| at > Instant::now()) {
                return Ok(false);
            }
        }

        let inited = self.inner.initialized().await?;
        if inited {
            self.inited.store(true, Ordering::Release);
        } else {
            *self.not_inited_until.lock().unwrap() = self.config.expiry(Instant::now());
        }
        Ok(inited)
    }

    async fn close(&self) -> Result<()> {
        self.items.write().unwrap().clear();
        self.all.write().unwrap().clear();
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDatabase, MemoryStore};
    use flagstore_core::{DataBuilder, FEATURES};
    use serde_json::json;
    use std::sync::Arc;

    fn flag(key: &str, version: u64) -> Item {
        Item::new(key, version, json!({ "key": key }))
    }

    /// Delegates to a memory store, but pauses after every backend read and
    /// can be told to fail reads.
    struct SlowReads {
        inner: MemoryStore,
        delay: Duration,
        fail_reads: AtomicBool,
    }

    impl SlowReads {
        fn check(&self) -> Result<()> {
            if self.fail_reads.load(Ordering::Acquire) {
                return Err(crate::StoreError::InvalidData("read failed".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FeatureStore for SlowReads {
        async fn init(&self, data: FullDataSet) -> Result<()> {
            self.inner.init(data).await
        }

        async fn get(&self, kind: DataKind, key: &str) -> Result<Option<Item>> {
            self.check()?;
            let item = self.inner.get(kind, key).await?;
            tokio::time::sleep(self.delay).await;
            Ok(item)
        }

        async fn all(&self, kind: DataKind) -> Result<HashMap<String, Item>> {
            self.check()?;
            let items = self.inner.all(kind).await?;
            tokio::time::sleep(self.delay).await;
            Ok(items)
        }

        async fn upsert(&self, kind: DataKind, item: Item) -> Result<UpsertResult> {
            self.inner.upsert(kind, item).await
        }

        async fn initialized(&self) -> Result<bool> {
            self.inner.initialized().await
        }

        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
    }

    fn slow_pair(config: CacheConfig) -> (Arc<CachingStore<SlowReads>>, MemoryStore) {
        let db = MemoryDatabase::new();
        let slow = SlowReads {
            inner: MemoryStore::open(db.clone(), None),
            delay: Duration::from_millis(100),
            fail_reads: AtomicBool::new(false),
        };
        let cached = Arc::new(CachingStore::new(slow, config));
        (cached, MemoryStore::open(db, None))
    }

    /// `all` is in flight when the same instance applies a newer write.
    async fn assert_all_not_overwritten_by_older_read(config: CacheConfig) {
        let (store, _) = slow_pair(config);
        store.init(FullDataSet::empty()).await.unwrap();
        store.upsert(FEATURES, flag("k", 1)).await.unwrap();

        let reader = tokio::spawn({
            let store = store.clone();
            async move { store.all(FEATURES).await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.upsert(FEATURES, flag("k", 2)).await.unwrap().is_applied());

        let raced = reader.await.unwrap();
        assert_eq!(raced["k"].version(), 1);

        assert_eq!(store.all(FEATURES).await.unwrap()["k"].version(), 2);
        assert_eq!(store.all(FEATURES).await.unwrap()["k"].version(), 2);
        assert_eq!(store.get(FEATURES, "k").await.unwrap().unwrap().version(), 2);
    }

    /// `get` misses and is in flight when the same instance applies a newer write.
    async fn assert_get_not_overwritten_by_older_read(config: CacheConfig) {
        let (store, other) = slow_pair(config);
        store.init(FullDataSet::empty()).await.unwrap();
        other.upsert(FEATURES, flag("k", 1)).await.unwrap();

        let reader = tokio::spawn({
            let store = store.clone();
            async move { store.get(FEATURES, "k").await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.upsert(FEATURES, flag("k", 2)).await.unwrap().is_applied());

        assert_eq!(reader.await.unwrap().unwrap().version(), 1);
        assert_eq!(store.get(FEATURES, "k").await.unwrap().unwrap().version(), 2);
    }

    fn pair(config: CacheConfig) -> (CachingStore<MemoryStore>, MemoryStore) {
        let db = MemoryDatabase::new();
        let cached = CachingStore::new(MemoryStore::open(db.clone(), None), config);
        let other = MemoryStore::open(db, None);
        (cached, other)
    }

    #[test]
    fn test_ttl_sentinels() {
        assert!(CacheConfig::from_ttl(Duration::ZERO).is_infinite());
        assert!(CacheConfig::from_ttl_secs(0).is_infinite());
        assert!(CacheConfig::from_ttl_secs(-1).is_infinite());
        assert_eq!(
            CacheConfig::from_ttl_secs(30).mode,
            CacheMode::Ttl(Duration::from_secs(30))
        );
        assert!(!CacheConfig::disabled().is_enabled());
    }

    #[tokio::test]
    async fn test_get_served_from_cache_until_expiry() {
        let (store, other) = pair(CacheConfig::from_ttl(Duration::from_millis(100)));
        store
            .init(DataBuilder::new().add(FEATURES, flag("a", 1)).build())
            .await
            .unwrap();

        other.upsert(FEATURES, flag("a", 2)).await.unwrap();
        assert_eq!(store.get(FEATURES, "a").await.unwrap().unwrap().version(), 1);
        assert_eq!(store.stats().hits, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get(FEATURES, "a").await.unwrap().unwrap().version(), 2);
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_forever_mode_never_rereads() {
        let (store, other) = pair(CacheConfig::forever());
        store.init(FullDataSet::empty()).await.unwrap();
        assert!(store.get(FEATURES, "a").await.unwrap().is_none());

        other.upsert(FEATURES, flag("a", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get(FEATURES, "a").await.unwrap().is_none());
        assert!(store.all(FEATURES).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_upsert_caches_winner() {
        let (store, other) = pair(CacheConfig::forever());
        store
            .init(DataBuilder::new().add(FEATURES, flag("a", 1)).build())
            .await
            .unwrap();
        other.upsert(FEATURES, flag("a", 5)).await.unwrap();

        let result = store.upsert(FEATURES, flag("a", 3)).await.unwrap();
        assert_eq!(result, UpsertResult::Superseded);
        assert_eq!(store.get(FEATURES, "a").await.unwrap().unwrap().version(), 5);
    }

    #[tokio::test]
    async fn test_forever_all_read_overlapping_write() {
        assert_all_not_overwritten_by_older_read(CacheConfig::forever()).await;
    }

    #[tokio::test]
    async fn test_ttl_all_read_overlapping_write() {
        assert_all_not_overwritten_by_older_read(CacheConfig::from_ttl(Duration::from_secs(60)))
            .await;
    }

    #[tokio::test]
    async fn test_forever_get_read_overlapping_write() {
        assert_get_not_overwritten_by_older_read(CacheConfig::forever()).await;
    }

    #[tokio::test]
    async fn test_ttl_get_read_overlapping_write() {
        assert_get_not_overwritten_by_older_read(CacheConfig::from_ttl(Duration::from_secs(60)))
            .await;
    }

    #[tokio::test]
    async fn test_failed_reread_after_superseded_drops_entry() {
        let (store, other) = slow_pair(CacheConfig::forever());
        store
            .init(DataBuilder::new().add(FEATURES, flag("a", 1)).build())
            .await
            .unwrap();
        other.upsert(FEATURES, flag("a", 5)).await.unwrap();

        store.inner().fail_reads.store(true, Ordering::Release);
        assert!(store.upsert(FEATURES, flag("a", 3)).await.is_err());

        store.inner().fail_reads.store(false, Ordering::Release);
        assert_eq!(store.get(FEATURES, "a").await.unwrap().unwrap().version(), 5);
    }

    #[tokio::test]
    async fn test_upsert_invalidates_all() {
        let (store, _) = pair(CacheConfig::forever());
        store.init(FullDataSet::empty()).await.unwrap();
        assert!(store.all(FEATURES).await.unwrap().is_empty());

        store.upsert(FEATURES, flag("a", 1)).await.unwrap();
        assert_eq!(store.all(FEATURES).await.unwrap().len(), 1);

        store.upsert(FEATURES, Item::tombstone("a", 2)).await.unwrap();
        assert!(store.all(FEATURES).await.unwrap().is_empty());
        assert!(store.get(FEATURES, "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialized_latches() {
        let db = MemoryDatabase::new();
        let store = CachingStore::new(
            MemoryStore::open(db.clone(), None),
            CacheConfig::from_ttl(Duration::from_millis(10)),
        );
        let other = MemoryStore::open(db.clone(), None);

        other.init(FullDataSet::empty()).await.unwrap();
        assert!(store.initialized().await.unwrap());

        db.clear();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_negative_initialized_is_cached_for_ttl() {
        let (store, other) = pair(CacheConfig::from_ttl(Duration::from_millis(100)));
        assert!(!store.initialized().await.unwrap());

        other.init(FullDataSet::empty()).await.unwrap();
        assert!(!store.initialized().await.unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_is_pass_through() {
        let (store, other) = pair(CacheConfig::disabled());
        store.init(FullDataSet::empty()).await.unwrap();
        other.upsert(FEATURES, flag("a", 1)).await.unwrap();
        assert_eq!(store.get(FEATURES, "a").await.unwrap().unwrap().version(), 1);
        assert_eq!(store.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_wraps_shared_handle() {
        let inner: Arc<dyn FeatureStore> = Arc::new(MemoryStore::new());
        let store = CachingStore::new(inner.clone(), CacheConfig::default());
        store.init(FullDataSet::empty()).await.unwrap();
        assert!(inner.initialized().await.unwrap());
    }
}
