//! reqwest implementation of [`InstanceApi`].

use super::{InstanceApi, InstanceError, PUSH_SUBSCRIPTION_PATH};
use async_trait::async_trait;
use push_types::{InstanceOrigin, NotificationDetail, PushRegistration};
use reqwest::{Client, Response};
use url::Url;

/// HTTP client for Mastodon-compatible instances.
#[derive(Debug, Clone)]
pub struct MastodonClient {
    client: Client,
}

impl MastodonClient {
    /// Build a client with the bridge's user agent.
    pub fn new() -> Result<Self, InstanceError> {
        let client = Client::builder()
            .user_agent(concat!("fedipush/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InstanceError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn check(response: Response) -> Result<Response, InstanceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(InstanceError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

const NOTIFICATIONS_PATH: &str = "/api/v1/notifications";

/// `{origin}/api/v1/notifications/{id}` with `id` escaped as one path segment.
fn notification_url(origin: &InstanceOrigin, notification_id: &str) -> Result<Url, InstanceError> {
    let mut url = Url::parse(&origin.join(NOTIFICATIONS_PATH))
        .map_err(|e| InstanceError::Transport(format!("bad instance URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| InstanceError::Transport(format!("{origin} cannot carry a path")))?
        .push(notification_id);
    Ok(url)
}

#[async_trait]
impl InstanceApi for MastodonClient {
    async fn register(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
        registration: &PushRegistration,
    ) -> Result<(), InstanceError> {
        let response = self
            .client
            .post(origin.join(PUSH_SUBSCRIPTION_PATH))
            .bearer_auth(access_token)
            .json(registration)
            .send()
            .await
            .map_err(|e| InstanceError::Transport(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn deregister(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
    ) -> Result<(), InstanceError> {
        let response = self
            .client
            .delete(origin.join(PUSH_SUBSCRIPTION_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| InstanceError::Transport(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn notification(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
        notification_id: &str,
    ) -> Result<NotificationDetail, InstanceError> {
        let response = self
            .client
            .get(notification_url(origin, notification_id)?)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| InstanceError::Transport(e.to_string()))?;

        Self::check(response)
            .await?
            .json::<NotificationDetail>()
            .await
            .map_err(|e| InstanceError::Decode(e.to_string()))
    }
}
