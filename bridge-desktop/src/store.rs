//! Collection storage using SQLite
//!
//! All collections share one table keyed by `(collection, key)`. Each
//! trait call is a single statement, which SQLite executes atomically.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{CollectionStore, StoredEntry},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::path::{Path, PathBuf};
use tracing::debug;

const DATABASE_FILE: &str = "narration-cache.db";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        collection TEXT NOT NULL,
        key TEXT NOT NULL,
        payload BLOB NOT NULL,
        sync_when_online INTEGER NOT NULL DEFAULT 0,
        sync_attempts INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (collection, key)
    )
"#;

/// Default on-disk location: `<data dir>/narration-platform/narration-cache.db`
pub fn default_database_path() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| BridgeError::NotAvailable("user data directory".to_string()))?;
    Ok(base.join("narration-platform").join(DATABASE_FILE))
}

/// SQLite-backed [`CollectionStore`]
#[derive(Clone)]
pub struct SqliteCollectionStore {
    pool: SqlitePool,
}

impl SqliteCollectionStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| storage_error("connect", e))?;

        let store = Self { pool };
        store.migrate().await?;
        debug!(path = ?db_path, "Initialized collection store");
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| storage_error("connect", e))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("create table", e))?;
        Ok(())
    }

    fn entry_from_row(row: &SqliteRow) -> Result<StoredEntry> {
        let payload: Vec<u8> = row.try_get("payload").map_err(|e| storage_error("read", e))?;
        let sync_when_online: i64 = row
            .try_get("sync_when_online")
            .map_err(|e| storage_error("read", e))?;
        let sync_attempts: i64 = row
            .try_get("sync_attempts")
            .map_err(|e| storage_error("read", e))?;
        let updated_at: i64 = row.try_get("updated_at").map_err(|e| storage_error("read", e))?;

        Ok(StoredEntry {
            key: row.try_get("key").map_err(|e| storage_error("read", e))?,
            payload: Bytes::from(payload),
            sync_when_online: sync_when_online != 0,
            sync_attempts: u32::try_from(sync_attempts).unwrap_or(0),
            updated_at: DateTime::<Utc>::from_timestamp_millis(updated_at).unwrap_or_default(),
        })
    }
}

fn storage_error(op: &str, e: sqlx::Error) -> BridgeError {
    BridgeError::Storage(format!("{} failed: {}", op, e))
}

#[async_trait]
impl CollectionStore for SqliteCollectionStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredEntry>> {
        let row = sqlx::query(
            "SELECT key, payload, sync_when_online, sync_attempts, updated_at \
             FROM cache_entries WHERE collection = ? AND key = ?",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("get", e))?;

        row.as_ref().map(Self::entry_from_row).transpose()
    }

    async fn put(&self, collection: &str, entry: StoredEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries
                (collection, key, payload, sync_when_online, sync_attempts, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET
                payload = excluded.payload,
                sync_when_online = excluded.sync_when_online,
                sync_attempts = excluded.sync_attempts,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(&entry.key)
        .bind(entry.payload.as_ref())
        .bind(entry.sync_when_online as i64)
        .bind(i64::from(entry.sync_attempts))
        .bind(entry.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("put", e))?;

        debug!(collection, key = %entry.key, pending = entry.sync_when_online, "Stored entry");
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("delete", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn contains(&self, collection: &str, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM cache_entries WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("contains", e))?;

        Ok(row.is_some())
    }

    async fn update_sync_state(
        &self,
        collection: &str,
        key: &str,
        expected_payload: &[u8],
        sync_when_online: bool,
        sync_attempts: u32,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE cache_entries SET sync_when_online = ?, sync_attempts = ? \
             WHERE collection = ? AND key = ? AND payload = ?",
        )
        .bind(sync_when_online as i64)
        .bind(i64::from(sync_attempts))
        .bind(collection)
        .bind(key)
        .bind(expected_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("update sync state", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query(
            "SELECT key, payload, sync_when_online, sync_attempts, updated_at \
             FROM cache_entries WHERE collection = ? ORDER BY key",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list", e))?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn list_pending(&self, collection: &str) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query(
            "SELECT key, payload, sync_when_online, sync_attempts, updated_at \
             FROM cache_entries WHERE collection = ? AND sync_when_online = 1 ORDER BY key",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list pending", e))?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE collection = ?")
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("clear", e))?;

        debug!(collection, "Cleared collection");
        Ok(())
    }
}
