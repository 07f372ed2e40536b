//! Client for the Mastodon-compatible instance REST API.
//!
//! Three calls are needed:
//! - `POST /api/v1/push/subscription` registers the bridge as push endpoint
//! - `DELETE /api/v1/push/subscription` removes it
//! - `GET /api/v1/notifications/{id}` fetches detail for enrichment
//!
//! All use bearer auth. Nothing is retried.

mod mastodon;
mod mock;

pub use mastodon::MastodonClient;
pub use mock::{InstanceCall, MockInstance};

use async_trait::async_trait;
use push_types::{InstanceOrigin, NotificationDetail, PushRegistration};
use thiserror::Error;

/// Path of the push subscription resource.
pub const PUSH_SUBSCRIPTION_PATH: &str = "/api/v1/push/subscription";

/// Instance API errors.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// The instance answered with a non-success status.
    #[error("instance returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request could not be sent or the response not read.
    #[error("instance unreachable: {0}")]
    Transport(String),

    /// The response body was not the expected JSON.
    #[error("unexpected instance response: {0}")]
    Decode(String),
}

/// Operations the bridge performs against an instance.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    /// Register a Web Push subscription for the account behind `access_token`.
    async fn register(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
        registration: &PushRegistration,
    ) -> Result<(), InstanceError>;

    /// Remove the account's Web Push subscription.
    async fn deregister(&self, origin: &InstanceOrigin, access_token: &str)
        -> Result<(), InstanceError>;

    /// Fetch a notification by id.
    async fn notification(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
        notification_id: &str,
    ) -> Result<NotificationDetail, InstanceError>;
}
