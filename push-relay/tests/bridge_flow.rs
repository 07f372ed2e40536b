//! End-to-end flows through the HTTP router with mock instance and provider.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use fedipush_relay::config::Config;
use fedipush_relay::http::build_router;
use fedipush_relay::instance::MockInstance;
use fedipush_relay::provider::MockPushProvider;
use fedipush_relay::server::PushBridge;
use fedipush_relay::storage::SqliteKv;
use push_ece::EncryptedPayload;
use push_types::{data_keys, DeviceToken, InstanceOrigin, NotificationDetail, StatusDetail};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

const ORIGIN: &str = "https://example.social";

struct Harness {
    bridge: Arc<PushBridge>,
    app: Router,
    instance: MockInstance,
    provider: MockPushProvider,
}

impl Harness {
    async fn new() -> Self {
        let kv = SqliteKv::in_memory().await.unwrap();
        let instance = MockInstance::new();
        let provider = MockPushProvider::new();
        let bridge = Arc::new(
            PushBridge::new(
                Config::default(),
                Arc::new(kv),
                Arc::new(instance.clone()),
                Arc::new(provider.clone()),
            )
            .unwrap(),
        );
        let app = build_router(Arc::clone(&bridge));
        Self {
            bridge,
            app,
            instance,
            provider,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("host", "bridge.example.org")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn subscribe(&self, device_token: &str) -> String {
        let (status, body) = self
            .post_json(
                "/subscriptions",
                json!({
                    "deviceToken": device_token,
                    "instanceToken": "instance-access",
                    "instanceOrigin": ORIGIN,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "subscribe failed: {body}");
        body["subscriptionId"].as_str().unwrap().to_string()
    }

    async fn unsubscribe(&self, id: &str) -> StatusCode {
        self.post_json(
            "/subscriptions/delete",
            json!({
                "subscriptionId": id,
                "instanceToken": "instance-access",
                "instanceOrigin": ORIGIN,
            }),
        )
        .await
        .0
    }

    /// Encrypt `plaintext` with the keys the instance received for the latest registration.
    fn seal(&self, plaintext: &[u8]) -> (String, EncryptedPayload) {
        let registration = self.instance.registrations().pop().unwrap();
        let public = URL_SAFE_NO_PAD
            .decode(&registration.subscription.keys.p256dh)
            .unwrap();
        let auth = URL_SAFE_NO_PAD
            .decode(&registration.subscription.keys.auth)
            .unwrap();
        let path = registration
            .subscription
            .endpoint
            .strip_prefix("https://bridge.example.org")
            .unwrap()
            .to_string();
        (path, push_ece::encrypt(plaintext, &public, &auth).unwrap())
    }

    async fn deliver(&self, path: &str, payload: &EncryptedPayload) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-encoding", "aesgcm")
                .header("crypto-key", payload.crypto_key_header())
                .header("encryption", payload.encryption_header())
                .body(Body::from(payload.body.clone()))
                .unwrap(),
        )
        .await
    }
}

fn notification_payload(id: u64) -> Vec<u8> {
    json!({
        "notification_id": id,
        "access_token": "user-access",
        "title": "Alice mentioned you",
        "notification_type": "mention",
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn subscribing_twice_reuses_subscription() {
    let h = Harness::new().await;

    let first = h.subscribe("tok-A").await;
    let second = h.subscribe("tok-A").await;

    assert_eq!(first, second);
    assert_eq!(h.instance.register_count(), 1);
}

#[tokio::test]
async fn registration_points_instance_at_webhook() {
    let h = Harness::new().await;
    let id = h.subscribe("tok-A").await;

    let registration = h.instance.registrations().pop().unwrap();
    assert_eq!(
        registration.subscription.endpoint,
        format!("https://bridge.example.org/subscriptions/{id}")
    );
    assert_eq!(
        URL_SAFE_NO_PAD
            .decode(&registration.subscription.keys.p256dh)
            .unwrap()
            .len(),
        65
    );
}

#[tokio::test]
async fn delivery_is_decrypted_enriched_and_forwarded() {
    let h = Harness::new().await;
    h.subscribe("tok-A").await;
    h.instance.add_notification(
        "9",
        NotificationDetail {
            id: Some("9".into()),
            kind: Some("reblog".into()),
            status: Some(StatusDetail {
                id: Some("200".into()),
                visibility: Some("public".into()),
                reblog: Some(Box::new(StatusDetail {
                    id: Some("150".into()),
                    ..Default::default()
                })),
            }),
        },
    );

    let (path, payload) = h.seal(&notification_payload(9));
    let (status, body) = h.deliver(&path, &payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let sent = h.provider.last_sent().unwrap();
    assert_eq!(sent.token, "tok-A");
    assert_eq!(sent.title, "Patchwork");
    assert_eq!(sent.body, "Alice mentioned you");
    assert_eq!(sent.data_value(data_keys::NOTI_TYPE), Some("reblog"));
    assert_eq!(sent.data_value(data_keys::REBLOGGED_ID), Some("150"));
    assert_eq!(sent.data_value(data_keys::DESTINATION_ID), Some("200"));
}

#[tokio::test]
async fn tampered_delivery_is_rejected_without_push() {
    let h = Harness::new().await;
    h.subscribe("tok-A").await;

    let (path, mut payload) = h.seal(&notification_payload(1));
    let last = payload.body.len() - 1;
    payload.body[last] ^= 0x80;

    let (status, body) = h.deliver(&path, &payload).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert_eq!(h.provider.attempts(), 0);
}

#[tokio::test]
async fn delivery_without_crypto_headers_is_400() {
    let h = Harness::new().await;
    h.subscribe("tok-A").await;
    let (path, payload) = h.seal(&notification_payload(1));

    let (status, _) = h
        .send(
            Request::builder()
                .method("POST")
                .uri(&path)
                .body(Body::from(payload.body.clone()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.provider.attempts(), 0);
}

#[tokio::test]
async fn unsubscribe_then_resubscribe_issues_fresh_subscription() {
    let h = Harness::new().await;
    let s1 = h.subscribe("tok-A").await;
    let (old_path, old_payload) = h.seal(&notification_payload(1));

    assert_eq!(h.unsubscribe(&s1).await, StatusCode::OK);
    assert_eq!(h.bridge.subscription_count().await, 0);
    let token = DeviceToken::new("tok-A").unwrap();
    let origin = InstanceOrigin::parse(ORIGIN).unwrap();
    assert!(h.bridge.store().find(&token, &origin).await.unwrap().is_none());

    let s2 = h.subscribe("tok-A").await;
    assert_ne!(s1, s2);
    assert_eq!(h.instance.register_count(), 2);

    let (status, _) = h.deliver(&old_path, &old_payload).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn revoked_token_removes_subscription() {
    let h = Harness::new().await;
    let id = h.subscribe("tok-A").await;
    let (path, payload) = h.seal(&notification_payload(1));
    h.provider.fail_next_unregistered();

    let (status, _) = h.deliver(&path, &payload).await;
    assert_eq!(status, StatusCode::OK);

    let parsed = id.parse().unwrap();
    assert!(h.bridge.store().get(&parsed).await.unwrap().is_none());

    let (status, _) = h.deliver(&path, &payload).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn instance_rejection_stores_nothing() {
    let h = Harness::new().await;
    h.instance.fail_next_register(422, r#"{"error":"Validation failed"}"#);

    let (status, body) = h
        .post_json(
            "/subscriptions",
            json!({
                "deviceToken": "tok-A",
                "instanceToken": "instance-access",
                "instanceOrigin": ORIGIN,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["details"].as_str().unwrap().contains("Validation failed"));
    assert_eq!(h.bridge.subscription_count().await, 0);
}

#[tokio::test]
async fn missing_fields_are_400() {
    let h = Harness::new().await;

    let (status, _) = h
        .post_json("/subscriptions", json!({ "deviceToken": "tok-A" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .post_json("/subscriptions/delete", json!({ "instanceToken": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.instance.register_count(), 0);
}

#[tokio::test]
async fn legacy_routes_and_field_names_work() {
    let h = Harness::new().await;

    let (status, body) = h
        .post_json(
            "/api/subscribe",
            json!({
                "fcmToken": "tok-legacy",
                "mastodonToken": "instance-access",
                "mastodonInstance": "example.social",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Subscription created successfully.");
    let id = body["subscriptionId"].as_str().unwrap().to_string();

    let (_, payload) = h.seal(&notification_payload(5));
    let (status, _) = h.deliver(&format!("/api/notify?id={id}"), &payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.provider.last_sent().unwrap().token, "tok-legacy");

    let (status, body) = h
        .post_json(
            "/api/unsubscribe",
            json!({
                "subscriptionId": id,
                "mastodonToken": "instance-access",
                "mastodonInstance": "example.social",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Unsubscribed successfully.");
    assert_eq!(h.bridge.subscription_count().await, 0);
}
