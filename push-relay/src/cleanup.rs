//! Background cleanup task.
//!
//! Purges expired store entries, reconciles the dedup index against the
//! records, and evicts idle rate limiter keys.

use crate::config::CleanupConfig;
use crate::error::StorageError;
use crate::server::PushBridge;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// What one cleanup pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Expired rows deleted.
    pub expired: u64,
    /// Index entries removed because their record is gone.
    pub dangling_removed: u64,
    /// Records whose index entry was rewritten.
    pub relinked: u64,
}

/// Run one cleanup pass.
pub async fn run_cleanup(bridge: &PushBridge) -> Result<CleanupReport, StorageError> {
    let expired = bridge.store().kv().purge_expired().await?;
    let reconciled = bridge.store().reconcile().await?;
    bridge.rate_limits().shrink();

    Ok(CleanupReport {
        expired,
        dangling_removed: reconciled.dangling_removed,
        relinked: reconciled.relinked,
    })
}

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    bridge: Arc<PushBridge>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs;
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            match run_cleanup(&bridge).await {
                Ok(report) if report == CleanupReport::default() => {
                    tracing::debug!("Cleanup: nothing to do");
                }
                Ok(report) => {
                    tracing::info!(
                        expired = report.expired,
                        dangling_removed = report.dangling_removed,
                        relinked = report.relinked,
                        "Cleanup pass finished"
                    );
                }
                Err(e) => {
                    tracing::error!("Cleanup error: {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::instance::MockInstance;
    use crate::provider::MockPushProvider;
    use crate::storage::subscriptions::{index_key, record_key};
    use crate::storage::{current_timestamp, KvStore, SqliteKv};
    use push_types::{DeviceToken, InstanceOrigin, KeyMaterial, SubscriptionId, SubscriptionRecord};

    async fn test_bridge() -> Arc<PushBridge> {
        let kv = SqliteKv::in_memory().await.unwrap();
        Arc::new(
            PushBridge::new(
                Config::default(),
                Arc::new(kv),
                Arc::new(MockInstance::new()),
                Arc::new(MockPushProvider::new()),
            )
            .unwrap(),
        )
    }

    fn record(token: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            id: SubscriptionId::new(),
            device_token: DeviceToken::new(token).unwrap(),
            instance_origin: InstanceOrigin::parse("example.social").unwrap(),
            keys: KeyMaterial::new(vec![1u8; 32], vec![2u8; 16]),
            created_at: current_timestamp(),
        }
    }

    #[tokio::test]
    async fn cleanup_removes_expired_rows() {
        let bridge = test_bridge().await;
        let kv = bridge.store().kv();
        kv.set("sub:stale", "{}", 0).await.unwrap();

        let report = run_cleanup(&bridge).await.unwrap();
        assert_eq!(report.expired, 1);
    }

    #[tokio::test]
    async fn cleanup_reconciles_index() {
        let bridge = test_bridge().await;
        let store = bridge.store();

        let orphan = record("tok-orphan");
        store
            .kv()
            .set(
                &index_key(&orphan.device_token, &orphan.instance_origin),
                &orphan.id.to_string(),
                3600,
            )
            .await
            .unwrap();

        let unindexed = record("tok-unindexed");
        store.create(&unindexed).await.unwrap();
        assert!(store.kv().get(&record_key(&unindexed.id)).await.unwrap().is_some());

        let report = run_cleanup(&bridge).await.unwrap();
        assert_eq!(report.dangling_removed, 1);
        assert_eq!(report.relinked, 1);

        let found = store
            .find(&unindexed.device_token, &unindexed.instance_origin)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, unindexed.id);
    }

    #[tokio::test]
    async fn cleanup_task_disabled() {
        let bridge = test_bridge().await;
        let config = CleanupConfig {
            interval_secs: 1,
            enabled: false,
        };

        let handle = spawn_cleanup_task(bridge, config);

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("Task should complete when disabled")
            .expect("Task should not panic");
    }
}
