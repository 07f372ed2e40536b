//! Notification relay: enrich, build, send.
//!
//! Enrichment and delivery failures never fail the webhook. A provider
//! report that the device token is gone removes the subscription.

use crate::config::NotificationConfig;
use crate::instance::InstanceApi;
use crate::provider::PushProvider;
use crate::storage::SubscriptionStore;
use push_types::{data_keys, NotificationDetail, PushMessage, PushMetadata, SubscriptionRecord};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What happened to a relayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The provider accepted the message.
    Delivered,
    /// The token is unregistered and the subscription was removed.
    TokenRevoked,
    /// Delivery failed; logged and dropped.
    Failed,
}

/// Forwards decrypted notifications to the push provider.
#[derive(Clone)]
pub struct NotificationRelay {
    store: SubscriptionStore,
    instance: Arc<dyn InstanceApi>,
    provider: Arc<dyn PushProvider>,
    settings: NotificationConfig,
}

impl std::fmt::Debug for NotificationRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRelay")
            .field("provider", &self.provider.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl NotificationRelay {
    /// Create a relay.
    pub fn new(
        store: SubscriptionStore,
        instance: Arc<dyn InstanceApi>,
        provider: Arc<dyn PushProvider>,
        settings: NotificationConfig,
    ) -> Self {
        Self {
            store,
            instance,
            provider,
            settings,
        }
    }

    /// Enrich and deliver one notification.
    pub async fn relay(&self, record: &SubscriptionRecord, metadata: &PushMetadata) -> RelayOutcome {
        let detail = match self
            .instance
            .notification(
                &record.instance_origin,
                &metadata.access_token,
                &metadata.notification_id,
            )
            .await
        {
            Ok(detail) => Some(detail),
            Err(e) => {
                tracing::warn!(
                    subscription_id = %record.id,
                    instance = %record.instance_origin,
                    notification_id = %metadata.notification_id,
                    "Could not fetch notification detail: {}",
                    e
                );
                None
            }
        };

        let message = build_message(&self.settings, record, metadata, detail.as_ref());

        match self.provider.send(&message).await {
            Ok(name) => {
                tracing::info!(
                    subscription_id = %record.id,
                    provider = self.provider.name(),
                    message = %name,
                    "Push delivered"
                );
                RelayOutcome::Delivered
            }
            Err(e) if e.is_unregistered() => {
                tracing::info!(
                    subscription_id = %record.id,
                    "Device token no longer registered, removing subscription"
                );
                match self.store.remove(record).await {
                    Ok(()) => RelayOutcome::TokenRevoked,
                    Err(e) => {
                        tracing::error!(
                            subscription_id = %record.id,
                            "Failed to remove revoked subscription: {}",
                            e
                        );
                        RelayOutcome::Failed
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    subscription_id = %record.id,
                    provider = self.provider.name(),
                    "Push delivery failed: {}",
                    e
                );
                RelayOutcome::Failed
            }
        }
    }
}

/// Build the downstream message from metadata and optional instance detail.
pub fn build_message(
    settings: &NotificationConfig,
    record: &SubscriptionRecord,
    metadata: &PushMetadata,
    detail: Option<&NotificationDetail>,
) -> PushMessage {
    let status = detail.and_then(|d| d.status.as_ref());

    let noti_type = detail
        .and_then(|d| d.kind.clone())
        .or_else(|| metadata.notification_type.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let reblogged_id = status
        .and_then(|s| s.reblog.as_ref())
        .and_then(|r| r.id.clone())
        .unwrap_or_else(|| "0".to_string());
    let destination_id = status.and_then(|s| s.id.clone()).unwrap_or_default();
    let visibility = status
        .and_then(|s| s.visibility.clone())
        .unwrap_or_else(|| "public".to_string());

    let data = BTreeMap::from([
        (data_keys::NOTI_TYPE.to_string(), noti_type),
        (data_keys::REBLOGGED_ID.to_string(), reblogged_id),
        (data_keys::DESTINATION_ID.to_string(), destination_id),
        (data_keys::VISIBILITY.to_string(), visibility),
    ]);

    let body = metadata
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| settings.fallback_body.clone());

    PushMessage {
        token: record.device_token.as_str().to_string(),
        title: settings.title.clone(),
        body,
        data,
    }
}
