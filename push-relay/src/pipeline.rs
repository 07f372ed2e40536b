//! Inbound Web Push decryption.
//!
//! Looks up the subscription named in the webhook path, reads the `aesgcm`
//! parameters from the request headers and recovers the notification
//! metadata. The plaintext is never stored.

use crate::error::{BridgeError, Result};
use crate::storage::SubscriptionStore;
use push_ece::aesgcm::CONTENT_ENCODING;
use push_ece::EncryptionParams;
use push_types::{PushMetadata, SubscriptionId, SubscriptionRecord};

/// Transport headers of a push delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushHeaders<'a> {
    /// `Crypto-Key` (carries `dh`).
    pub crypto_key: Option<&'a str>,
    /// `Encryption` (carries `salt` and optional `rs`).
    pub encryption: Option<&'a str>,
    /// `Content-Encoding`, when sent.
    pub content_encoding: Option<&'a str>,
}

/// A decrypted delivery and the subscription it belongs to.
#[derive(Debug)]
pub struct Decrypted {
    /// The subscription.
    pub record: SubscriptionRecord,
    /// Decrypted notification metadata.
    pub metadata: PushMetadata,
}

/// Decrypts deliveries for stored subscriptions.
#[derive(Debug, Clone)]
pub struct DecryptionPipeline {
    store: SubscriptionStore,
}

impl DecryptionPipeline {
    /// Create a pipeline over a store.
    pub fn new(store: SubscriptionStore) -> Self {
        Self { store }
    }

    /// Decrypt a delivery addressed to `raw_id`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotFound`] for an unknown or unparseable id
    /// - [`BridgeError::MalformedRequest`] for missing or bad headers
    /// - [`BridgeError::Decryption`] / [`BridgeError::Key`] when decryption fails
    /// - [`BridgeError::PayloadFormat`] when the plaintext is not notification JSON
    pub async fn decrypt(
        &self,
        raw_id: &str,
        headers: &PushHeaders<'_>,
        body: &[u8],
    ) -> Result<Decrypted> {
        let id: SubscriptionId = raw_id.parse().map_err(|_| BridgeError::NotFound)?;
        let record = self.store.get(&id).await?.ok_or(BridgeError::NotFound)?;

        if let Some(encoding) = headers.content_encoding {
            if !encoding.trim().eq_ignore_ascii_case(CONTENT_ENCODING) {
                return Err(BridgeError::MalformedRequest(format!(
                    "unsupported content-encoding {encoding:?}"
                )));
            }
        }

        let params = EncryptionParams::from_headers(headers.crypto_key, headers.encryption)?;

        let plaintext = push_ece::decrypt(&record.keys, &params, body).map_err(|e| {
            tracing::error!(subscription_id = %id, "Failed to decrypt push: {}", e);
            BridgeError::from(e)
        })?;

        let metadata = parse_metadata(&plaintext).map_err(|e| {
            tracing::error!(subscription_id = %id, "Decrypted payload rejected: {}", e);
            e
        })?;

        tracing::debug!(
            subscription_id = %id,
            notification_id = %metadata.notification_id,
            "Decrypted push"
        );
        Ok(Decrypted { record, metadata })
    }
}

fn parse_metadata(plaintext: &[u8]) -> Result<PushMetadata> {
    let metadata: PushMetadata = serde_json::from_slice(plaintext)
        .map_err(|e| BridgeError::PayloadFormat(e.to_string()))?;
    if metadata.access_token.trim().is_empty() {
        return Err(BridgeError::PayloadFormat("access_token is empty".into()));
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{current_timestamp, SqliteKv};
    use push_ece::EncryptedPayload;
    use push_types::{DeviceToken, InstanceOrigin};
    use std::sync::Arc;

    const PAYLOAD: &[u8] = br#"{"notification_id":"3","access_token":"acc","title":"Bob boosted your post","notification_type":"reblog"}"#;

    struct Fixture {
        pipeline: DecryptionPipeline,
        record: SubscriptionRecord,
        public_key: [u8; 65],
    }

    async fn fixture() -> Fixture {
        let kv = SqliteKv::in_memory().await.unwrap();
        let store = SubscriptionStore::new(Arc::new(kv), 3600);
        let keys = push_ece::generate().unwrap();
        let record = SubscriptionRecord {
            id: SubscriptionId::new(),
            device_token: DeviceToken::new("tok-A").unwrap(),
            instance_origin: InstanceOrigin::parse("example.social").unwrap(),
            keys: keys.material.clone(),
            created_at: current_timestamp(),
        };
        store.create_with_index(&record).await.unwrap();
        Fixture {
            pipeline: DecryptionPipeline::new(store),
            record,
            public_key: keys.public_key,
        }
    }

    fn seal(fx: &Fixture, plaintext: &[u8]) -> EncryptedPayload {
        push_ece::encrypt(plaintext, &fx.public_key, fx.record.keys.auth_secret()).unwrap()
    }

    async fn run(fx: &Fixture, payload: &EncryptedPayload) -> Result<Decrypted> {
        let crypto_key = format!("{};p256ecdsa=BOGUS", payload.crypto_key_header());
        let encryption = payload.encryption_header();
        let headers = PushHeaders {
            crypto_key: Some(&crypto_key),
            encryption: Some(&encryption),
            content_encoding: Some("aesgcm"),
        };
        fx.pipeline
            .decrypt(&fx.record.id.to_string(), &headers, &payload.body)
            .await
    }

    #[tokio::test]
    async fn decrypts_stored_subscription() {
        let fx = fixture().await;
        let decrypted = run(&fx, &seal(&fx, PAYLOAD)).await.unwrap();

        assert_eq!(decrypted.record.id, fx.record.id);
        assert_eq!(decrypted.metadata.notification_id, "3");
        assert_eq!(decrypted.metadata.access_token, "acc");
        assert_eq!(decrypted.metadata.notification_type.as_deref(), Some("reblog"));
    }

    #[tokio::test]
    async fn unknown_and_garbage_ids_are_not_found() {
        let fx = fixture().await;
        let headers = PushHeaders::default();

        for id in [SubscriptionId::new().to_string(), "../etc".to_string()] {
            let result = fx.pipeline.decrypt(&id, &headers, b"x").await;
            assert!(matches!(result, Err(BridgeError::NotFound)));
        }
    }

    #[tokio::test]
    async fn missing_headers_are_malformed() {
        let fx = fixture().await;
        let payload = seal(&fx, PAYLOAD);
        let headers = PushHeaders {
            crypto_key: None,
            encryption: Some("salt=AAAA"),
            content_encoding: None,
        };

        let result = fx
            .pipeline
            .decrypt(&fx.record.id.to_string(), &headers, &payload.body)
            .await;
        assert!(matches!(result, Err(BridgeError::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn aes128gcm_is_rejected() {
        let fx = fixture().await;
        let payload = seal(&fx, PAYLOAD);
        let crypto_key = payload.crypto_key_header();
        let encryption = payload.encryption_header();
        let headers = PushHeaders {
            crypto_key: Some(&crypto_key),
            encryption: Some(&encryption),
            content_encoding: Some("aes128gcm"),
        };

        let result = fx
            .pipeline
            .decrypt(&fx.record.id.to_string(), &headers, &payload.body)
            .await;
        assert!(matches!(result, Err(BridgeError::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn tampered_body_fails_decryption() {
        let fx = fixture().await;
        let mut payload = seal(&fx, PAYLOAD);
        payload.body[0] ^= 0x01;

        assert!(matches!(run(&fx, &payload).await, Err(BridgeError::Decryption(_))));
    }

    #[tokio::test]
    async fn non_json_plaintext_is_payload_error() {
        let fx = fixture().await;
        let payload = seal(&fx, b"hello");

        assert!(matches!(run(&fx, &payload).await, Err(BridgeError::PayloadFormat(_))));
    }

    #[tokio::test]
    async fn missing_notification_id_is_payload_error() {
        let fx = fixture().await;
        let payload = seal(&fx, br#"{"access_token":"acc","title":"x"}"#);

        assert!(matches!(run(&fx, &payload).await, Err(BridgeError::PayloadFormat(_))));
    }

    #[tokio::test]
    async fn blank_access_token_is_payload_error() {
        let fx = fixture().await;
        let payload = seal(&fx, br#"{"notification_id":1,"access_token":"  "}"#);

        assert!(matches!(run(&fx, &payload).await, Err(BridgeError::PayloadFormat(_))));
    }
}
