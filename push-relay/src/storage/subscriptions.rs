//! Subscription records and the (device token, instance) dedup index.
//!
//! Keys:
//! - `sub:<id>` holds the JSON [`SubscriptionRecord`]
//! - `sublookup:<sha256(token)>:<origin>` holds the id
//!
//! Record and index are written and deleted in one transaction. The index is
//! still treated as a hint: [`SubscriptionStore::find`] verifies the record it
//! points at, and [`SubscriptionStore::reconcile`] repairs drift.

use super::{current_timestamp, KvStore};
use crate::error::StorageError;
use push_types::{DeviceToken, InstanceOrigin, SubscriptionId, SubscriptionRecord};
use std::sync::Arc;

/// Key prefix of subscription records.
pub const RECORD_PREFIX: &str = "sub:";

/// Key prefix of dedup index entries.
pub const INDEX_PREFIX: &str = "sublookup:";

/// Store key of a subscription record.
pub fn record_key(id: &SubscriptionId) -> String {
    format!("{RECORD_PREFIX}{id}")
}

/// Store key of the dedup index entry for a pair.
pub fn index_key(token: &DeviceToken, origin: &InstanceOrigin) -> String {
    format!("{INDEX_PREFIX}{}:{}", token.fingerprint(), origin)
}

/// Outcome of a [`SubscriptionStore::reconcile`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Index entries removed because their record is gone or belongs to another pair.
    pub dangling_removed: u64,
    /// Records whose missing index entry was rewritten.
    pub relinked: u64,
}

/// Subscription persistence over a [`KvStore`].
#[derive(Clone)]
pub struct SubscriptionStore {
    kv: Arc<dyn KvStore>,
    ttl_secs: u64,
}

impl std::fmt::Debug for SubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStore")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl SubscriptionStore {
    /// Wrap a KV store. Every write expires after `ttl_secs`.
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    /// The underlying KV store.
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Record lifetime in seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Write a record without touching the index. Overwrites.
    pub async fn create(&self, record: &SubscriptionRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(record)?;
        self.kv.set(&record_key(&record.id), &json, self.ttl_secs).await
    }

    /// Write a record and its index entry in one transaction.
    pub async fn create_with_index(&self, record: &SubscriptionRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(record)?;
        let entries = [
            (record_key(&record.id), json),
            (
                index_key(&record.device_token, &record.instance_origin),
                record.id.to_string(),
            ),
        ];
        self.kv.set_many(&entries, self.ttl_secs).await
    }

    /// Point the index for a pair at `id`.
    pub async fn index_put(
        &self,
        token: &DeviceToken,
        origin: &InstanceOrigin,
        id: &SubscriptionId,
    ) -> Result<(), StorageError> {
        self.kv
            .set(&index_key(token, origin), &id.to_string(), self.ttl_secs)
            .await
    }

    /// The id the index holds for a pair, if any.
    ///
    /// An unparseable entry reads as absent.
    pub async fn index_get(
        &self,
        token: &DeviceToken,
        origin: &InstanceOrigin,
    ) -> Result<Option<SubscriptionId>, StorageError> {
        let value = self.kv.get(&index_key(token, origin)).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Drop the index entry for a pair.
    pub async fn index_delete(
        &self,
        token: &DeviceToken,
        origin: &InstanceOrigin,
    ) -> Result<(), StorageError> {
        self.kv.delete(&index_key(token, origin)).await
    }

    /// Read a record. Absence is not an error.
    pub async fn get(&self, id: &SubscriptionId) -> Result<Option<SubscriptionRecord>, StorageError> {
        match self.kv.get(&record_key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Find the live record for a pair via the index.
    ///
    /// A stale entry (record gone, or the record belongs to another pair)
    /// reads as not found.
    pub async fn find(
        &self,
        token: &DeviceToken,
        origin: &InstanceOrigin,
    ) -> Result<Option<SubscriptionRecord>, StorageError> {
        let Some(id) = self.index_get(token, origin).await? else {
            return Ok(None);
        };

        let record = self.get(&id).await?;
        Ok(record.filter(|r| &r.device_token == token && &r.instance_origin == origin))
    }

    /// Delete a record by id, leaving any index entry. Idempotent.
    pub async fn delete(&self, id: &SubscriptionId) -> Result<(), StorageError> {
        self.kv.delete(&record_key(id)).await
    }

    /// Delete a record and its index entry in one transaction.
    ///
    /// The index entry is only removed if it still points at this record.
    pub async fn remove(&self, record: &SubscriptionRecord) -> Result<(), StorageError> {
        let mut keys = vec![record_key(&record.id)];
        let index = self
            .index_get(&record.device_token, &record.instance_origin)
            .await?;
        if index.map_or(true, |id| id == record.id) {
            keys.push(index_key(&record.device_token, &record.instance_origin));
        }
        self.kv.delete_many(&keys).await
    }

    /// Number of live subscription records.
    pub async fn count(&self) -> Result<u64, StorageError> {
        self.kv.count_prefix(RECORD_PREFIX).await
    }

    /// Repair drift between records and the index.
    ///
    /// Removes index entries whose record is missing or belongs to another
    /// pair, then rewrites missing index entries for live records, keeping
    /// the record's remaining lifetime.
    pub async fn reconcile(&self) -> Result<ReconcileReport, StorageError> {
        let mut report = ReconcileReport::default();

        let mut dangling = Vec::new();
        for entry in self.kv.scan_prefix(INDEX_PREFIX).await? {
            let target = match entry.value.parse::<SubscriptionId>() {
                Ok(id) => self.get(&id).await.unwrap_or_else(|e| {
                    tracing::warn!(key = %entry.key, "Unreadable record behind index: {}", e);
                    None
                }),
                Err(_) => None,
            };
            let matches = target.is_some_and(|r| {
                index_key(&r.device_token, &r.instance_origin) == entry.key
            });
            if !matches {
                dangling.push(entry.key);
            }
        }
        report.dangling_removed = dangling.len() as u64;
        self.kv.delete_many(&dangling).await?;

        let now = current_timestamp();
        for entry in self.kv.scan_prefix(RECORD_PREFIX).await? {
            let record: SubscriptionRecord = match serde_json::from_str(&entry.value) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(key = %entry.key, "Skipping unreadable record: {}", e);
                    continue;
                }
            };

            let key = index_key(&record.device_token, &record.instance_origin);
            if self.kv.get(&key).await?.is_some() {
                continue;
            }

            let remaining = entry.expires_at.saturating_sub(now).max(1) as u64;
            self.kv.set(&key, &record.id.to_string(), remaining).await?;
            report.relinked += 1;
        }

        Ok(report)
    }
}
