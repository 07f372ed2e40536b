//! Prometheus metrics endpoint.

use crate::server::PushBridge;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(bridge): Extension<Arc<PushBridge>>) -> impl IntoResponse {
    let m = bridge.metrics();

    // Gauges
    let subscriptions = bridge.subscription_count().await;
    let limiter_keys = bridge.rate_limits().webhook_keys_count();

    // Counters
    let created = m.subscriptions_created.load(Ordering::Relaxed);
    let reused = m.subscriptions_reused.load(Ordering::Relaxed);
    let deleted = m.subscriptions_deleted.load(Ordering::Relaxed);
    let webhooks = m.webhooks_received.load(Ordering::Relaxed);
    let decrypt_failures = m.decrypt_failures.load(Ordering::Relaxed);
    let sent = m.pushes_sent.load(Ordering::Relaxed);
    let failed = m.pushes_failed.load(Ordering::Relaxed);
    let revoked = m.tokens_revoked.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP fedipush_info Server information
# TYPE fedipush_info gauge
fedipush_info{{version="{version}"}} 1

# HELP fedipush_subscriptions Live subscriptions in the store
# TYPE fedipush_subscriptions gauge
fedipush_subscriptions {subscriptions}

# HELP fedipush_rate_limiter_keys Subscription ids tracked by the webhook limiter
# TYPE fedipush_rate_limiter_keys gauge
fedipush_rate_limiter_keys {limiter_keys}

# HELP fedipush_subscriptions_created_total Subscriptions created
# TYPE fedipush_subscriptions_created_total counter
fedipush_subscriptions_created_total {created}

# HELP fedipush_subscriptions_reused_total Subscribe calls answered with an existing subscription
# TYPE fedipush_subscriptions_reused_total counter
fedipush_subscriptions_reused_total {reused}

# HELP fedipush_subscriptions_deleted_total Unsubscribe calls completed
# TYPE fedipush_subscriptions_deleted_total counter
fedipush_subscriptions_deleted_total {deleted}

# HELP fedipush_webhooks_received_total Web Push deliveries received
# TYPE fedipush_webhooks_received_total counter
fedipush_webhooks_received_total {webhooks}

# HELP fedipush_decrypt_failures_total Deliveries that failed decryption or parsing
# TYPE fedipush_decrypt_failures_total counter
fedipush_decrypt_failures_total {decrypt_failures}

# HELP fedipush_pushes_sent_total Pushes accepted by the provider
# TYPE fedipush_pushes_sent_total counter
fedipush_pushes_sent_total {sent}

# HELP fedipush_pushes_failed_total Pushes rejected by the provider
# TYPE fedipush_pushes_failed_total counter
fedipush_pushes_failed_total {failed}

# HELP fedipush_tokens_revoked_total Subscriptions removed for unregistered tokens
# TYPE fedipush_tokens_revoked_total counter
fedipush_tokens_revoked_total {revoked}

# HELP fedipush_rate_limit_hits_total Total rate limit rejections
# TYPE fedipush_rate_limit_hits_total counter
fedipush_rate_limit_hits_total {rate_limits}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::instance::MockInstance;
    use crate::provider::MockPushProvider;
    use crate::storage::SqliteKv;

    #[tokio::test]
    async fn metrics_render_counters() {
        let kv = SqliteKv::in_memory().await.unwrap();
        let bridge = Arc::new(
            PushBridge::new(
                Config::default(),
                Arc::new(kv),
                Arc::new(MockInstance::new()),
                Arc::new(MockPushProvider::new()),
            )
            .unwrap(),
        );
        bridge.metrics().pushes_sent.fetch_add(3, Ordering::Relaxed);

        let response = metrics_handler(Extension(bridge)).await.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.contains("fedipush_pushes_sent_total 3"));
        assert!(text.contains("# TYPE fedipush_subscriptions gauge"));
        assert!(text.contains("fedipush_subscriptions 0"));
    }
}
