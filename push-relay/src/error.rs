//! Error types for push-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use push_ece::EceError;
use push_types::TypesError;
use serde::Serialize;
use std::path::PathBuf;

use crate::limits::RateLimitError;

/// Errors surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Missing or invalid request field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown subscription.
    #[error("subscription not found")]
    NotFound,

    /// Transport headers are missing or unparseable.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Stored or sender key is unusable.
    #[error("key error: {0}")]
    Key(String),

    /// Authentication tag mismatch, bad framing or bad padding.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Plaintext is not the expected notification JSON.
    #[error("payload format error: {0}")]
    PayloadFormat(String),

    /// The instance rejected the push registration.
    #[error("instance registration failed ({status:?}): {body}")]
    Registration {
        /// HTTP status from the instance, `None` when it was unreachable.
        status: Option<u16>,
        /// Response body or transport error.
        body: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {0}")]
    RateLimited(#[from] RateLimitError),
}

impl BridgeError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Key(_)
            | Self::Decryption(_)
            | Self::PayloadFormat(_)
            | Self::Registration { .. }
            | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            Self::Validation(reason) => ("Invalid request", reason.clone()),
            Self::NotFound => ("Subscription not found.", String::new()),
            Self::MalformedRequest(reason) => ("Malformed push request", reason.clone()),
            // Key and decryption details stay in the logs.
            Self::Key(_) | Self::Decryption(_) => ("Decryption failed", "unable to decrypt payload".into()),
            Self::PayloadFormat(_) => ("Decryption failed", "unexpected payload format".into()),
            Self::Registration { body, .. } => ("Instance API error", body.clone()),
            Self::Storage(_) => ("Internal Server Error", "storage unavailable".into()),
            Self::RateLimited(e) => ("Too many requests", e.to_string()),
        };
        ErrorBody {
            error,
            details: (!details.is_empty()).then_some(details),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<EceError> for BridgeError {
    fn from(e: EceError) -> Self {
        match e {
            EceError::MalformedHeader { .. } => Self::MalformedRequest(e.to_string()),
            EceError::InvalidKey(_) | EceError::KeyDerivation => Self::Key(e.to_string()),
            EceError::InvalidRecord(_)
            | EceError::DecryptionFailed
            | EceError::EncryptionFailed(_) => Self::Decryption(e.to_string()),
        }
    }
}

impl From<TypesError> for BridgeError {
    fn from(e: TypesError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be (de)serialized.
    #[error("corrupt stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
