//! Firebase Cloud Messaging (HTTP v1) provider.
//!
//! Authenticates with a service account: an RS256 JWT is exchanged for an
//! OAuth access token, which is cached until shortly before it expires.

use super::{PushError, PushProvider};
use crate::config::FcmConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use push_types::PushMessage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh this long before the token actually expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

static INSTALLED: OnceLock<Arc<FcmProvider>> = OnceLock::new();

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Google service-account credentials.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    /// Firebase project id.
    pub project_id: String,
    /// Service account email (JWT issuer).
    pub client_email: String,
    /// PEM-encoded RSA private key.
    private_key: String,
    /// OAuth token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Parse service-account JSON.
    pub fn from_json(json: &str) -> Result<Self, PushError> {
        serde_json::from_str(json).map_err(|e| PushError::Config(e.to_string()))
    }

    /// Parse base64-encoded service-account JSON.
    pub fn from_base64(encoded: &str) -> Result<Self, PushError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PushError::Config(format!("service account is not base64: {e}")))?;
        let json = String::from_utf8(bytes)
            .map_err(|e| PushError::Config(format!("service account is not UTF-8: {e}")))?;
        Self::from_json(&json)
    }

    /// Read service-account JSON from a file.
    pub fn from_file(path: &Path) -> Result<Self, PushError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PushError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Load credentials as configured: the file if set, else the env var.
    ///
    /// Returns `None` when neither is present.
    pub fn load(config: &FcmConfig) -> Result<Option<Self>, PushError> {
        if let Some(path) = &config.service_account_path {
            return Self::from_file(path).map(Some);
        }
        match std::env::var(&config.service_account_env) {
            Ok(value) if !value.trim().is_empty() => Self::from_base64(&value).map(Some),
            _ => Ok(None),
        }
    }
}

struct AccessToken {
    token: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + TOKEN_MARGIN
    }
}

/// FCM HTTP v1 provider.
pub struct FcmProvider {
    account: ServiceAccount,
    client: Client,
    send_url: String,
    access_token: RwLock<Option<AccessToken>>,
}

impl std::fmt::Debug for FcmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcmProvider")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl FcmProvider {
    /// Create a provider. No network traffic until the first send.
    pub fn new(account: ServiceAccount) -> Result<Self, PushError> {
        let client = Client::builder()
            .user_agent(concat!("fedipush/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PushError::Config(e.to_string()))?;

        let send_url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            account.project_id
        );

        Ok(Self {
            account,
            client,
            send_url,
            access_token: RwLock::new(None),
        })
    }

    /// Install `provider` as the process-wide instance.
    ///
    /// Fails with [`PushError::AlreadyInitialized`] on a second call.
    pub fn install(provider: Self) -> Result<Arc<Self>, PushError> {
        let shared = Arc::new(provider);
        INSTALLED
            .set(Arc::clone(&shared))
            .map_err(|_| PushError::AlreadyInitialized)?;
        tracing::info!(project = %shared.account.project_id, "FCM provider installed");
        Ok(shared)
    }

    /// The process-wide instance, if installed.
    pub fn installed() -> Option<Arc<Self>> {
        INSTALLED.get().cloned()
    }

    async fn access_token(&self) -> Result<String, PushError> {
        {
            let cached = self.access_token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.access_token.write().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.token.clone());
        }

        let token = self.fetch_access_token().await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_access_token(&self) -> Result<AccessToken, PushError> {
        use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let now = crate::storage::current_timestamp();
        let claims = Claims {
            iss: &self.account.client_email,
            scope: FCM_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .map_err(|e| PushError::Config(format!("invalid private key: {e}")))?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| PushError::Config(format!("JWT encoding failed: {e}")))?;

        let response = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", jwt.as_str())])
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Auth(format!("token exchange {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PushError::Auth(format!("unreadable token response: {e}")))?;

        tracing::debug!(expires_in = token.expires_in, "Refreshed FCM access token");

        Ok(AccessToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        let access_token = self.access_token().await?;

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&FcmRequest::from(message))
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let sent: FcmResponse = response
                .json()
                .await
                .map_err(|e| PushError::Transport(e.to_string()))?;
            return Ok(sent.name);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify(status.as_u16(), &body);
        if matches!(error, PushError::Auth(_)) {
            // Force a new token next time.
            *self.access_token.write().await = None;
        }
        Err(error)
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

/// Map an FCM error response to a [`PushError`].
fn classify(status: u16, body: &str) -> PushError {
    let parsed = serde_json::from_str::<FcmErrorBody>(body).ok();
    let error_code = parsed.as_ref().and_then(|b| {
        b.error
            .details
            .iter()
            .find_map(|d| d.error_code.clone())
    });
    let message = parsed
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    match (status, error_code.as_deref()) {
        (_, Some("UNREGISTERED")) | (404, _) => PushError::Unregistered,
        (429, _) | (_, Some("QUOTA_EXCEEDED")) => PushError::RateLimited,
        (401 | 403, _) => PushError::Auth(message),
        _ => PushError::Provider { status, message },
    }
}

// FCM API types

#[derive(Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

impl<'a> From<&'a PushMessage> for FcmRequest<'a> {
    fn from(message: &'a PushMessage) -> Self {
        Self {
            message: FcmMessage {
                token: &message.token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
            },
        }
    }
}

#[derive(Deserialize)]
struct FcmResponse {
    name: String,
}

#[derive(Deserialize)]
struct FcmErrorBody {
    error: FcmErrorStatus,
}

#[derive(Deserialize)]
struct FcmErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Deserialize)]
struct FcmErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}
