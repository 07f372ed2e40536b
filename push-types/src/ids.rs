//! Identity types for fedipush.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A unique identifier for a bridge subscription.
///
/// UUID v4 format. Appears in the webhook URL handed to the instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    /// Create a new random SubscriptionId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for SubscriptionId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| TypesError::InvalidId(s.to_string()))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// Opaque token addressing a device at the push provider.
///
/// Never printed in full; `Debug` shows a short fingerprint.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceToken(String);

impl DeviceToken {
    /// Create a DeviceToken, rejecting blank input.
    pub fn new(token: impl Into<String>) -> Result<Self, TypesError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(TypesError::EmptyField("deviceToken"));
        }
        Ok(Self(token))
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 of the token.
    ///
    /// Fixed length, so it can be embedded in composite store keys without ambiguity.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({})", &self.fingerprint()[..8])
    }
}

/// Normalized origin of a federated instance, e.g. `https://example.social`.
///
/// Scheme and host (plus non-default port), lowercase host, no path and no
/// trailing slash.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceOrigin(String);

impl InstanceOrigin {
    /// Normalize user input into an origin.
    ///
    /// `example.social`, `https://example.social/` and `HTTPS://Example.Social`
    /// all yield `https://example.social`. Input without a scheme gets `https://`.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TypesError::EmptyField("instanceOrigin"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let invalid = |reason: String| TypesError::InvalidOrigin {
            input: raw.to_string(),
            reason,
        };

        let url = url::Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme {other:?}"))),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self(url.origin().ascii_serialization()))
    }

    /// The origin as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL for an API path on this instance.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }
}

impl TryFrom<String> for InstanceOrigin {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InstanceOrigin> for String {
    fn from(origin: InstanceOrigin) -> Self {
        origin.0
    }
}

impl fmt::Display for InstanceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for InstanceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceOrigin({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_id_is_uuid_v4() {
        let id = SubscriptionId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn subscription_id_parses_display_form() {
        let id = SubscriptionId::new();
        let parsed: SubscriptionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn subscription_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<SubscriptionId>().is_err());
        assert!("".parse::<SubscriptionId>().is_err());
    }

    #[test]
    fn device_token_rejects_blank() {
        assert!(DeviceToken::new("   ").is_err());
        assert!(DeviceToken::new("").is_err());
    }

    #[test]
    fn device_token_fingerprint_is_fixed_length() {
        let short = DeviceToken::new("a").unwrap();
        let long = DeviceToken::new("x".repeat(300)).unwrap();
        assert_eq!(short.fingerprint().len(), 64);
        assert_eq!(long.fingerprint().len(), 64);
    }

    #[test]
    fn device_token_debug_hides_token() {
        let token = DeviceToken::new("secret-device-token").unwrap();
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[test]
    fn origin_adds_scheme() {
        let origin = InstanceOrigin::parse("example.social").unwrap();
        assert_eq!(origin.as_str(), "https://example.social");
    }

    #[test]
    fn origin_strips_trailing_slash_and_path() {
        assert_eq!(
            InstanceOrigin::parse("https://example.social/").unwrap().as_str(),
            "https://example.social"
        );
        assert_eq!(
            InstanceOrigin::parse("https://example.social/web/home")
                .unwrap()
                .as_str(),
            "https://example.social"
        );
    }

    #[test]
    fn origin_lowercases_host_and_keeps_port() {
        let origin = InstanceOrigin::parse("  HTTP://Example.Social:3000/ ").unwrap();
        assert_eq!(origin.as_str(), "http://example.social:3000");
    }

    #[test]
    fn origin_is_idempotent() {
        let once = InstanceOrigin::parse("example.social/").unwrap();
        let twice = InstanceOrigin::parse(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn origin_rejects_other_schemes() {
        assert!(InstanceOrigin::parse("ftp://example.social").is_err());
        assert!(InstanceOrigin::parse("").is_err());
    }

    #[test]
    fn origin_join_builds_api_url() {
        let origin = InstanceOrigin::parse("example.social").unwrap();
        assert_eq!(
            origin.join("/api/v1/push/subscription"),
            "https://example.social/api/v1/push/subscription"
        );
    }
}
