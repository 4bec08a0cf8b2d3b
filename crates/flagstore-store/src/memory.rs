//! In-memory implementation of the FeatureStore trait.
//!
//! A [`MemoryDatabase`] plays the role of the shared physical backend: any
//! number of [`MemoryStore`] handles may point at it, with the same
//! prefixing and conditional-write semantics as SQLite. Nothing is persisted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use flagstore_core::{DataKind, FullDataSet, Item};

use crate::error::{Result, StoreError};
use crate::prefix::KeyPrefix;
use crate::traits::{FeatureStore, UpdateHook, UpsertResult};

/// Shared in-memory backend.
///
/// Thread-safe via RwLock. All data is lost when the last handle is dropped.
#[derive(Default)]
pub struct MemoryDatabase {
    inner: RwLock<MemoryDatabaseInner>,
}

#[derive(Default)]
struct MemoryDatabaseInner {
    /// scope -> key -> item (tombstones included).
    scopes: HashMap<String, HashMap<String, Item>>,

    /// Init markers of every initialized prefix.
    inited: HashSet<String>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Remove every item and init marker under every prefix.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.scopes.clear();
        inner.inited.clear();
    }
}

/// A handle on a [`MemoryDatabase`] under one key prefix.
pub struct MemoryStore {
    db: Arc<MemoryDatabase>,
    prefix: KeyPrefix,
    hook: Option<UpdateHook>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create a store over a private database with the default prefix.
    pub fn new() -> Self {
        Self::open(MemoryDatabase::new(), None)
    }

    /// Open a handle on a shared database.
    pub fn open(db: Arc<MemoryDatabase>, prefix: Option<&str>) -> Self {
        Self {
            db,
            prefix: KeyPrefix::new(prefix),
            hook: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Install a callback that runs inside `upsert` just before the
    /// conditional write.
    pub fn with_update_hook(mut self, hook: UpdateHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn stored_version(&self, scope: &str, key: &str) -> Option<u64> {
        let inner = self.db.inner.read().unwrap();
        inner
            .scopes
            .get(scope)
            .and_then(|items| items.get(key))
            .map(Item::version)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn init(&self, data: FullDataSet) -> Result<()> {
        self.ensure_open()?;
        let mut inner = self.db.inner.write().unwrap();

        for (kind, items) in data {
            inner.scopes.insert(self.prefix.scope(kind), items.into_iter().collect());
        }
        inner.inited.insert(self.prefix.init_marker());

        Ok(())
    }

    async fn get(&self, kind: DataKind, key: &str) -> Result<Option<Item>> {
        self.ensure_open()?;
        let inner = self.db.inner.read().unwrap();
        Ok(inner
            .scopes
            .get(&self.prefix.scope(kind))
            .and_then(|items| items.get(key))
            .filter(|item| !item.is_deleted())
            .cloned())
    }

    async fn all(&self, kind: DataKind) -> Result<HashMap<String, Item>> {
        self.ensure_open()?;
        let inner = self.db.inner.read().unwrap();
        Ok(inner
            .scopes
            .get(&self.prefix.scope(kind))
            .map(|items| {
                items
                    .iter()
                    .filter(|(_, item)| !item.is_deleted())
                    .map(|(k, item)| (k.clone(), item.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, kind: DataKind, item: Item) -> Result<UpsertResult> {
        self.ensure_open()?;
        let scope = self.prefix.scope(kind);

        // Versions only grow, so a stale read that already wins is final.
        if !item.supersedes(self.stored_version(&scope, item.key())) {
            tracing::debug!(
                kind = %kind,
                key = item.key(),
                version = item.version(),
                "upsert superseded"
            );
            return Ok(UpsertResult::Superseded);
        }

        if let Some(hook) = &self.hook {
            hook().await;
        }

        let mut inner = self.db.inner.write().unwrap();
        let items = inner.scopes.entry(scope).or_default();
        let stored = items.get(item.key()).map(Item::version);
        if !item.supersedes(stored) {
            tracing::debug!(
                kind = %kind,
                key = item.key(),
                version = item.version(),
                "upsert lost race"
            );
            return Ok(UpsertResult::Superseded);
        }
        items.insert(item.key().to_string(), item);

        Ok(UpsertResult::Applied)
    }

    async fn initialized(&self) -> Result<bool> {
        self.ensure_open()?;
        let inner = self.db.inner.read().unwrap();
        Ok(inner.inited.contains(&self.prefix.init_marker()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
