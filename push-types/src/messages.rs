//! Notification payloads exchanged with the instance and the push provider.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Keys of the data map attached to every downstream push.
pub mod data_keys {
    /// Notification type (`mention`, `favourite`, ...).
    pub const NOTI_TYPE: &str = "noti_type";
    /// Id of the reblogged status, `"0"` when not a reblog.
    pub const REBLOGGED_ID: &str = "reblogged_id";
    /// Id of the status the notification points at.
    pub const DESTINATION_ID: &str = "destination_id";
    /// Visibility of that status.
    pub const VISIBILITY: &str = "visibility";
}

/// Plaintext carried inside an encrypted Web Push delivery.
#[derive(Clone, Deserialize)]
pub struct PushMetadata {
    /// Notification id on the instance. Mastodon sends a number, others a string.
    #[serde(deserialize_with = "string_or_number")]
    pub notification_id: String,
    /// Token scoped to the notification owner, used to fetch details.
    pub access_token: String,
    /// Human readable title.
    #[serde(default)]
    pub title: Option<String>,
    /// Human readable body.
    #[serde(default)]
    pub body: Option<String>,
    /// Notification type as reported in the push.
    #[serde(default)]
    pub notification_type: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub icon: Option<String>,
    /// Locale of the recipient.
    #[serde(default)]
    pub preferred_locale: Option<String>,
}

impl fmt::Debug for PushMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushMetadata")
            .field("notification_id", &self.notification_id)
            .field("notification_type", &self.notification_type)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) if !s.is_empty() => Ok(s),
        Raw::Text(_) => Err(serde::de::Error::custom("notification_id is empty")),
        Raw::Number(n) => Ok(n.to_string()),
    }
}

/// Subset of the instance's notification entity used for enrichment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationDetail {
    /// Notification id.
    #[serde(default)]
    pub id: Option<String>,
    /// Notification type.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Status attached to the notification, if any.
    #[serde(default)]
    pub status: Option<StatusDetail>,
}

/// Subset of a status entity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusDetail {
    /// Status id.
    #[serde(default)]
    pub id: Option<String>,
    /// `public`, `unlisted`, `private` or `direct`.
    #[serde(default)]
    pub visibility: Option<String>,
    /// The original status when this one is a reblog.
    #[serde(default)]
    pub reblog: Option<Box<StatusDetail>>,
}

/// Message handed to the downstream push provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    /// Device token to deliver to.
    pub token: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// String-only data payload.
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    /// Look up a data value.
    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Alert categories requested from the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Alerts {
    /// New followers.
    pub follow: bool,
    /// Favourites of own statuses.
    pub favourite: bool,
    /// Boosts of own statuses.
    pub reblog: bool,
    /// Mentions.
    pub mention: bool,
    /// Ended polls.
    pub poll: bool,
}

impl Default for Alerts {
    fn default() -> Self {
        Self {
            follow: true,
            favourite: true,
            reblog: true,
            mention: true,
            poll: true,
        }
    }
}

/// Body of `POST /api/v1/push/subscription`.
#[derive(Debug, Clone, Serialize)]
pub struct PushRegistration {
    /// Endpoint and keys.
    pub subscription: RegistrationSubscription,
    /// Alert preferences.
    pub data: RegistrationData,
}

/// Endpoint half of a registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSubscription {
    /// Webhook URL the instance will POST encrypted pushes to.
    pub endpoint: String,
    /// Public key material, base64url without padding.
    pub keys: RegistrationKeys,
}

/// Public keys of a registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationKeys {
    /// Uncompressed P-256 public key.
    pub p256dh: String,
    /// Auth secret.
    pub auth: String,
}

/// Preferences half of a registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationData {
    /// Requested alert categories.
    pub alerts: Alerts,
}

impl PushRegistration {
    /// Build a registration for `endpoint` with the subscription's public keys.
    pub fn new(endpoint: impl Into<String>, public_key: &[u8], auth_secret: &[u8]) -> Self {
        Self {
            subscription: RegistrationSubscription {
                endpoint: endpoint.into(),
                keys: RegistrationKeys {
                    p256dh: URL_SAFE_NO_PAD.encode(public_key),
                    auth: URL_SAFE_NO_PAD.encode(auth_secret),
                },
            },
            data: RegistrationData {
                alerts: Alerts::default(),
            },
        }
    }
}
