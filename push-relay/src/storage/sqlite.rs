//! SQLite key-value backend for push-relay.

use super::{current_timestamp, KvEntry, KvStore};
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite-backed key-value store with per-key expiry.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKv")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl SqliteKv {
    /// Open a store at a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let url = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // A single connection that is never recycled, or the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Close the pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn expiry(ttl_secs: u64) -> i64 {
        current_timestamp().saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
    }
}

const UPSERT: &str = r#"
    INSERT INTO kv (key, value, expires_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
"#;

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv WHERE key = ?1 AND expires_at > ?2",
        )
        .bind(key)
        .bind(current_timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StorageError> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(Self::expiry(ttl_secs))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl_secs: u64,
    ) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }

        let expires_at = Self::expiry(ttl_secs);
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(UPSERT)
                .bind(key)
                .bind(value)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for key in keys {
            sqlx::query("DELETE FROM kv WHERE key = ?1")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>, StorageError> {
        let rows = sqlx::query_as::<_, KvRow>(
            r#"
            SELECT key, value, expires_at
            FROM kv
            WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2
            ORDER BY key ASC
            "#,
        )
        .bind(prefix)
        .bind(current_timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(KvEntry::from).collect())
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM kv WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2",
        )
        .bind(prefix)
        .bind(current_timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn purge_expired(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM kv WHERE expires_at <= ?1")
            .bind(current_timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct KvRow {
    key: String,
    value: String,
    expires_at: i64,
}

impl From<KvRow> for KvEntry {
    fn from(row: KvRow) -> Self {
        KvEntry {
            key: row.key,
            value: row.value,
            expires_at: row.expires_at,
        }
    }
}
