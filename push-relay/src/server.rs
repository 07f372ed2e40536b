//! Main PushBridge coordination.
//!
//! PushBridge owns the subscription store, the lifecycle, the decryption
//! pipeline and the relay, and applies rate limits and metrics around them.

use crate::config::{Config, ConfigError};
use crate::error::{BridgeError, Result};
use crate::instance::InstanceApi;
use crate::lifecycle::{Lifecycle, Subscribed};
use crate::limits::RateLimits;
use crate::notify::{NotificationRelay, RelayOutcome};
use crate::pipeline::{DecryptionPipeline, PushHeaders};
use crate::provider::PushProvider;
use crate::storage::{KvStore, SubscriptionStore};
use push_types::SubscriptionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Operational metrics for monitoring bridge activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// Subscriptions created.
    pub subscriptions_created: AtomicU64,
    /// Subscribe calls answered with an existing subscription.
    pub subscriptions_reused: AtomicU64,
    /// Unsubscribe calls completed.
    pub subscriptions_deleted: AtomicU64,
    /// Webhook deliveries received (before rate limiting).
    pub webhooks_received: AtomicU64,
    /// Deliveries that failed decryption or payload parsing.
    pub decrypt_failures: AtomicU64,
    /// Pushes accepted by the provider.
    pub pushes_sent: AtomicU64,
    /// Pushes the provider rejected.
    pub pushes_failed: AtomicU64,
    /// Subscriptions removed because the device token was revoked.
    pub tokens_revoked: AtomicU64,
    /// Rate limit rejections (webhook + global).
    pub rate_limit_hits: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// The bridge service.
pub struct PushBridge {
    config: Config,
    store: SubscriptionStore,
    lifecycle: Lifecycle,
    pipeline: DecryptionPipeline,
    relay: NotificationRelay,
    rate_limits: RateLimits,
    metrics: BridgeMetrics,
}

impl std::fmt::Debug for PushBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushBridge")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl PushBridge {
    /// Create a bridge over a KV backend, an instance client and a push provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the rate limits are invalid.
    pub fn new(
        config: Config,
        kv: Arc<dyn KvStore>,
        instance: Arc<dyn InstanceApi>,
        provider: Arc<dyn PushProvider>,
    ) -> std::result::Result<Self, ConfigError> {
        let rate_limits = RateLimits::new(&config.limits)?;
        let store = SubscriptionStore::new(kv, config.storage.retention_secs);
        let lifecycle = Lifecycle::new(store.clone(), Arc::clone(&instance));
        let pipeline = DecryptionPipeline::new(store.clone());
        let relay = NotificationRelay::new(
            store.clone(),
            instance,
            provider,
            config.notification.clone(),
        );

        Ok(Self {
            config,
            store,
            lifecycle,
            pipeline,
            relay,
            rate_limits,
            metrics: BridgeMetrics::default(),
        })
    }

    /// Get the bridge configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the subscription store.
    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Create or reuse a subscription. See [`Lifecycle::subscribe`].
    pub async fn subscribe(
        &self,
        device_token: &str,
        instance_token: &str,
        raw_instance: &str,
        endpoint_base: &str,
    ) -> Result<Subscribed> {
        self.rate_limited(self.rate_limits.check_global())?;

        let subscribed = self
            .lifecycle
            .subscribe(device_token, instance_token, raw_instance, endpoint_base)
            .await?;

        if subscribed.reused {
            bump(&self.metrics.subscriptions_reused);
        } else {
            bump(&self.metrics.subscriptions_created);
        }
        Ok(subscribed)
    }

    /// Delete a subscription. See [`Lifecycle::unsubscribe`].
    pub async fn unsubscribe(
        &self,
        raw_id: &str,
        instance_token: &str,
        raw_instance: &str,
    ) -> Result<()> {
        self.rate_limited(self.rate_limits.check_global())?;

        self.lifecycle
            .unsubscribe(raw_id, instance_token, raw_instance)
            .await?;
        bump(&self.metrics.subscriptions_deleted);
        Ok(())
    }

    /// Handle one inbound Web Push delivery.
    ///
    /// Returns once the delivery has been consumed. Relay failures are
    /// reported through the outcome, not as errors.
    pub async fn handle_webhook(
        &self,
        raw_id: &str,
        headers: &PushHeaders<'_>,
        body: &[u8],
    ) -> Result<RelayOutcome> {
        bump(&self.metrics.webhooks_received);
        self.rate_limited(self.rate_limits.check_global())?;

        let id: SubscriptionId = raw_id.parse().map_err(|_| BridgeError::NotFound)?;
        self.rate_limited(self.rate_limits.check_webhook(&id))?;

        let decrypted = match self.pipeline.decrypt(raw_id, headers, body).await {
            Ok(decrypted) => decrypted,
            Err(e) => {
                if matches!(
                    e,
                    BridgeError::Key(_) | BridgeError::Decryption(_) | BridgeError::PayloadFormat(_)
                ) {
                    bump(&self.metrics.decrypt_failures);
                }
                return Err(e);
            }
        };

        let outcome = self
            .relay
            .relay(&decrypted.record, &decrypted.metadata)
            .await;

        match outcome {
            RelayOutcome::Delivered => bump(&self.metrics.pushes_sent),
            RelayOutcome::TokenRevoked => {
                bump(&self.metrics.pushes_failed);
                bump(&self.metrics.tokens_revoked);
            }
            RelayOutcome::Failed => bump(&self.metrics.pushes_failed),
        }
        Ok(outcome)
    }

    /// Number of live subscriptions, best effort.
    pub async fn subscription_count(&self) -> u64 {
        match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Failed to count subscriptions: {}", e);
                0
            }
        }
    }

    fn rate_limited<T>(
        &self,
        check: std::result::Result<T, crate::limits::RateLimitError>,
    ) -> Result<T> {
        check.map_err(|e| {
            bump(&self.metrics.rate_limit_hits);
            tracing::debug!("Rejected request: {}", e);
            BridgeError::from(e)
        })
    }
}
