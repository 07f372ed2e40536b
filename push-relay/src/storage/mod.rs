//! Storage layer for push-relay.
//!
//! A string key-value store with per-key expiry, and the subscription
//! store built on top of it.

mod sqlite;
pub mod subscriptions;

pub use sqlite::SqliteKv;
pub use subscriptions::{ReconcileReport, SubscriptionStore};

use crate::error::StorageError;
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

/// A live key-value entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Key.
    pub key: String,
    /// Value (JSON or a bare id).
    pub value: String,
    /// Unix timestamp after which the entry is gone.
    pub expires_at: i64,
}

/// Trait for key-value storage backends.
///
/// Expired entries are invisible to every read even before
/// [`purge_expired`](KvStore::purge_expired) removes them.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value that expires `ttl_secs` from now. Overwrites.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StorageError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Write several values in one transaction.
    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64)
        -> Result<(), StorageError>;

    /// Delete several keys in one transaction.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError>;

    /// All live entries whose key starts with `prefix`, ordered by key.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>, StorageError>;

    /// Number of live entries whose key starts with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> Result<u64, StorageError>;

    /// Remove expired entries.
    ///
    /// Returns the number of entries deleted.
    async fn purge_expired(&self) -> Result<u64, StorageError>;
}

pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
