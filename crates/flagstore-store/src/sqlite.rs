//! SQLite implementation of the FeatureStore trait.
//!
//! This is the database-backed store. Several `SqliteStore` handles, in one
//! process or many, may open the same file; the database is the arbiter for
//! conflicting writes. Statements run inside `tokio::task::spawn_blocking`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flagstore_core::{DataKind, FullDataSet, Item, ItemBuilder};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::prefix::KeyPrefix;
use crate::traits::{FeatureStore, UpdateHook, UpsertResult};

/// How long a statement waits on another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Write `?3..?5` under `(?1, ?2)` unless a version >= `?3` is already stored.
///
/// The version comparison is part of the statement, so no other writer can
/// slip in between the check and the write.
const CONDITIONAL_UPSERT: &str = "INSERT INTO items (scope, key, version, deleted, data, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(scope, key) DO UPDATE SET
         version = excluded.version,
         deleted = excluded.deleted,
         data = excluded.data,
         updated_at = excluded.updated_at
     WHERE excluded.version > items.version";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. The connection is dropped on `close`.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex. `None` once closed.
    conn: Arc<Mutex<Option<Connection>>>,
    prefix: KeyPrefix,
    hook: Option<UpdateHook>,
}

/// A row of the `items` table before payload decoding.
struct ItemRow {
    key: String,
    version: i64,
    deleted: bool,
    data: String,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get("key")?,
            version: row.get("version")?,
            deleted: row.get("deleted")?,
            data: row.get("data")?,
        })
    }

    fn into_item(self) -> Result<Item> {
        let version = u64::try_from(self.version)
            .map_err(|_| StoreError::InvalidData(format!("negative version for {}", self.key)))?;
        Ok(ItemBuilder::new(self.key)
            .version(version)
            .deleted(self.deleted)
            .data(serde_json::from_str(&self.data)?)
            .build())
    }
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>, prefix: Option<&str>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, prefix)
    }

    /// Open a private in-memory SQLite database.
    ///
    /// Useful for testing. Data is not shared with any other handle.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(mut conn: Connection, prefix: Option<&str>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            prefix: KeyPrefix::new(prefix),
            hook: None,
        })
    }

    /// Install a callback that runs inside `upsert` just before the
    /// conditional write.
    pub fn with_update_hook(mut self, hook: UpdateHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    /// Delete every item and init marker under every prefix.
    pub async fn clear_all(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.execute_batch("DELETE FROM items; DELETE FROM init_markers;")?;
            Ok(())
        })
        .await
    }

    /// Execute a blocking operation on the connection.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            let conn = guard.as_mut().ok_or(StoreError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }

    async fn stored_version(&self, scope: String, key: String) -> Result<Option<u64>> {
        self.blocking(move |conn| {
            let version: Option<i64> = conn
                .query_row(
                    "SELECT version FROM items WHERE scope = ?1 AND key = ?2",
                    params![scope, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(version.and_then(|v| u64::try_from(v).ok()))
        })
        .await
    }
}

fn to_sql_version(item: &Item) -> Result<i64> {
    i64::try_from(item.version()).map_err(|_| {
        StoreError::InvalidData(format!(
            "version {} of {} exceeds the SQLite integer range",
            item.version(),
            item.key()
        ))
    })
}

#[async_trait]
impl FeatureStore for SqliteStore {
    async fn init(&self, data: FullDataSet) -> Result<()> {
        let prefix = self.prefix.clone();

        self.blocking(move |conn| {
            let now = now_millis();
            let tx = conn.transaction()?;

            for (kind, items) in &data {
                tx.execute(
                    "DELETE FROM items WHERE scope = ?1",
                    params![prefix.scope(*kind)],
                )?;

                let mut stmt = tx.prepare_cached(
                    "INSERT INTO items (scope, key, version, deleted, data, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for item in items.values() {
                    stmt.execute(params![
                        prefix.scope(*kind),
                        item.key(),
                        to_sql_version(item)?,
                        item.is_deleted(),
                        serde_json::to_string(item.data())?,
                        now,
                    ])?;
                }
            }

            tx.execute(
                "INSERT OR REPLACE INTO init_markers (marker, initialized_at) VALUES (?1, ?2)",
                params![prefix.init_marker(), now],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, kind: DataKind, key: &str) -> Result<Option<Item>> {
        let scope = self.prefix.scope(kind);
        let key = key.to_string();

        let row = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT key, version, deleted, data FROM items WHERE scope = ?1 AND key = ?2",
                    params![scope, key],
                    ItemRow::from_row,
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        match row {
            Some(row) if !row.deleted => Ok(Some(row.into_item()?)),
            _ => Ok(None),
        }
    }

    async fn all(&self, kind: DataKind) -> Result<HashMap<String, Item>> {
        let scope = self.prefix.scope(kind);

        let rows = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, version, deleted, data FROM items
                     WHERE scope = ?1 AND deleted = 0",
                )?;
                let rows = stmt
                    .query_map(params![scope], ItemRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|row| row.into_item().map(|item| (item.key().to_string(), item)))
            .collect()
    }

    async fn upsert(&self, kind: DataKind, item: Item) -> Result<UpsertResult> {
        let scope = self.prefix.scope(kind);

        // Advisory read: versions only grow, so if we already lose we are done.
        let stored = self
            .stored_version(scope.clone(), item.key().to_string())
            .await?;
        if !item.supersedes(stored) {
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

        let version = to_sql_version(&item)?;
        let data = serde_json::to_string(item.data())?;
        let key = item.key().to_string();
        let deleted = item.is_deleted();

        let changed = self
            .blocking(move |conn| {
                let changed = conn.execute(
                    CONDITIONAL_UPSERT,
                    params![scope, key, version, deleted, data, now_millis()],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            tracing::debug!(
                kind = %kind,
                key = item.key(),
                version = item.version(),
                "upsert lost race"
            );
            return Ok(UpsertResult::Superseded);
        }
        Ok(UpsertResult::Applied)
    }

    async fn initialized(&self) -> Result<bool> {
        let marker = self.prefix.init_marker();

        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM init_markers WHERE marker = ?1",
                    params![marker],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let taken = conn.lock().ok().and_then(|mut guard| guard.take());
            match taken {
                Some(conn) => conn.close().map_err(|(_, e)| StoreError::Database(e)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}
