//! Downstream push delivery.
//!
//! [`FcmProvider`] talks to FCM HTTP v1; [`MockPushProvider`] records
//! messages for tests.

mod fcm;
mod mock;

pub use fcm::{FcmProvider, ServiceAccount};
pub use mock::MockPushProvider;

use async_trait::async_trait;
use push_types::PushMessage;
use thiserror::Error;

/// Push provider errors.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    /// The device token is no longer registered.
    #[error("device token is not registered")]
    Unregistered,

    /// The provider throttled us.
    #[error("provider rate limited")]
    RateLimited,

    /// Obtaining or using provider credentials failed.
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// The provider rejected the message.
    #[error("provider error {status}: {message}")]
    Provider {
        /// HTTP status.
        status: u16,
        /// Error message from the provider.
        message: String,
    },

    /// The request could not be sent.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials are missing or malformed.
    #[error("provider configuration error: {0}")]
    Config(String),

    /// A process-wide provider is already installed.
    #[error("push provider already initialized")]
    AlreadyInitialized,
}

impl PushError {
    /// Whether the device token should be forgotten.
    pub fn is_unregistered(&self) -> bool {
        matches!(self, Self::Unregistered)
    }
}

/// A downstream push delivery channel.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Deliver a message. Returns the provider's message name.
    async fn send(&self, message: &PushMessage) -> Result<String, PushError>;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}
