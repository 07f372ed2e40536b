//! Persisted subscription state.

use crate::{DeviceToken, InstanceOrigin, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the Web Push auth secret in bytes.
pub const AUTH_SECRET_SIZE: usize = 16;

/// Private half of a subscription's push-encryption keys.
///
/// Stored as base64 so the record stays readable JSON. Zeroed on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    /// P-256 private scalar (32 bytes, big-endian).
    #[serde(with = "b64")]
    private_key: Vec<u8>,
    /// Web Push auth secret.
    #[serde(rename = "auth", with = "b64")]
    auth_secret: Vec<u8>,
}

impl KeyMaterial {
    /// Bundle a private key and auth secret.
    pub fn new(private_key: Vec<u8>, auth_secret: Vec<u8>) -> Self {
        Self {
            private_key,
            auth_secret,
        }
    }

    /// The private scalar bytes.
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// The auth secret bytes.
    pub fn auth_secret(&self) -> &[u8] {
        &self.auth_secret
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

/// A bridge subscription: one device token, one instance, one key set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Downstream push destination.
    pub device_token: DeviceToken,
    /// Instance that delivers pushes for this subscription.
    pub instance_origin: InstanceOrigin,
    /// Decryption keys.
    pub keys: KeyMaterial,
    /// Unix timestamp of creation.
    #[serde(default)]
    pub created_at: i64,
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> SubscriptionRecord {
        SubscriptionRecord {
            id: SubscriptionId::new(),
            device_token: DeviceToken::new("tok-A").unwrap(),
            instance_origin: InstanceOrigin::parse("example.social").unwrap(),
            keys: KeyMaterial::new(vec![7u8; 32], vec![9u8; AUTH_SECRET_SIZE]),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn record_uses_camel_case_fields() {
        let json = serde_json::to_value(sample_record()).unwrap();
        assert_eq!(json["deviceToken"], "tok-A");
        assert_eq!(json["instanceOrigin"], "https://example.social");
        assert!(json["keys"]["privateKey"].is_string());
        assert!(json["keys"]["auth"].is_string());
    }

    #[test]
    fn record_survives_json() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let restored: SubscriptionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, record.id);
        assert_eq!(restored.keys, record.keys);
        assert_eq!(restored.instance_origin, record.instance_origin);
    }

    #[test]
    fn record_rejects_bad_origin() {
        let mut json = serde_json::to_value(sample_record()).unwrap();
        json["instanceOrigin"] = "gopher://example.social".into();
        assert!(serde_json::from_value::<SubscriptionRecord>(json).is_err());
    }

    #[test]
    fn key_material_debug_is_redacted() {
        let keys = KeyMaterial::new(vec![0xAA; 32], vec![0xBB; 16]);
        let printed = format!("{keys:?}");
        assert!(!printed.contains("170"));
        assert!(printed.starts_with("KeyMaterial"));
    }
}
