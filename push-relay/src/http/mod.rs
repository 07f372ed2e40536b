//! HTTP endpoints for push-relay.
//!
//! Subscription management, the Web Push webhook, health and metrics.
//! The `/api/*` routes keep the paths the first deployment used.

pub mod health;
mod metrics;
mod subscriptions;
mod webhook;

use crate::server::PushBridge;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(bridge: Arc<PushBridge>) -> Router {
    let mut router = Router::new()
        .route(
            "/subscriptions",
            post(subscriptions::create_handler).delete(subscriptions::delete_handler),
        )
        .route("/subscriptions/delete", post(subscriptions::delete_handler))
        .route("/subscriptions/:id", post(webhook::webhook_handler))
        .route("/api/subscribe", post(subscriptions::create_handler))
        .route("/api/unsubscribe", post(subscriptions::delete_handler))
        .route("/api/notify", post(webhook::legacy_webhook_handler))
        .route("/health", get(health::health_handler));

    if bridge.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(bridge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::instance::MockInstance;
    use crate::provider::MockPushProvider;
    use crate::storage::SqliteKv;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    async fn test_bridge(config: Config) -> Arc<PushBridge> {
        let kv = SqliteKv::in_memory().await.unwrap();
        Arc::new(
            PushBridge::new(
                config,
                Arc::new(kv),
                Arc::new(MockInstance::new()),
                Arc::new(MockPushProvider::new()),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_bridge(Config::default()).await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let app = build_router(test_bridge(Config::default()).await);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_can_be_disabled() {
        let mut config = Config::default();
        config.http.metrics_enabled = false;
        let app = build_router(test_bridge(config).await);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_for_unknown_subscription_is_404() {
        let app = build_router(test_bridge(Config::default()).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/subscriptions/{}", push_types::SubscriptionId::new()))
                    .body(Body::from("x"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn legacy_notify_without_id_is_400() {
        let app = build_router(test_bridge(Config::default()).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/notify")
                    .body(Body::from("x"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
