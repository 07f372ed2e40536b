//! Rate limiting for push-relay.
//!
//! Webhook deliveries are limited per subscription, and every request counts
//! against a global limiter. Both use governor; the keyed limiter is backed
//! by DashMap.

use crate::config::{ConfigError, LimitsConfig};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use push_types::SubscriptionId;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the bridge.
#[derive(Clone)]
pub struct RateLimits {
    /// Webhook deliveries per subscription id.
    webhook_limiter: Arc<KeyedLimiter<SubscriptionId>>,
    /// Aggregate request rate.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("webhook_limiter", &"KeyedLimiter<SubscriptionId>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a configured rate is zero.
    pub fn new(config: &LimitsConfig) -> Result<Self, ConfigError> {
        let per_minute =
            NonZeroU32::new(config.webhook_per_minute).ok_or(ConfigError::Invalid {
                field: "limits.webhook_per_minute",
                reason: "must be > 0",
            })?;
        let global_rps =
            NonZeroU32::new(config.global_requests_per_second).ok_or(ConfigError::Invalid {
                field: "limits.global_requests_per_second",
                reason: "must be > 0",
            })?;

        Ok(Self {
            webhook_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            global_limiter: Arc::new(RateLimiter::direct(Quota::per_second(global_rps))),
        })
    }

    /// Check if a webhook delivery for `id` is allowed.
    pub fn check_webhook(&self, id: &SubscriptionId) -> Result<(), RateLimitError> {
        self.webhook_limiter
            .check_key(id)
            .map_err(|_| RateLimitError::WebhookLimitExceeded)
    }

    /// Check if the global request rate is within limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Number of tracked subscription keys (for metrics).
    pub fn webhook_keys_count(&self) -> usize {
        self.webhook_limiter.len()
    }

    /// Evict idle entries from the keyed limiter. Called from the cleanup task.
    pub fn shrink(&self) {
        self.webhook_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many deliveries for one subscription.
    #[error("webhook rate limit exceeded")]
    WebhookLimitExceeded,
    /// Global request rate exceeded.
    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}
