//! Subscription lifecycle: `absent → pending → active → absent`.
//!
//! Subscribing is find-or-reuse per (device token, instance) pair. A new
//! subscription is only persisted after the instance accepted the
//! registration; unsubscribing always finishes local cleanup even when the
//! instance cannot be reached.

use crate::error::{BridgeError, Result};
use crate::instance::{InstanceApi, InstanceError};
use crate::storage::{current_timestamp, SubscriptionStore};
use push_types::{DeviceToken, InstanceOrigin, PushRegistration, SubscriptionId, SubscriptionRecord};
use std::sync::Arc;

/// Result of [`Lifecycle::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscribed {
    /// The subscription id (also the webhook path segment).
    pub id: SubscriptionId,
    /// True if an existing subscription for the pair was returned.
    pub reused: bool,
}

/// Creates and deletes subscriptions.
#[derive(Clone)]
pub struct Lifecycle {
    store: SubscriptionStore,
    instance: Arc<dyn InstanceApi>,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Webhook URL for a subscription under `endpoint_base`.
pub fn webhook_url(endpoint_base: &str, id: &SubscriptionId) -> String {
    format!("{}/subscriptions/{id}", endpoint_base.trim_end_matches('/'))
}

impl Lifecycle {
    /// Create a lifecycle over a store and instance client.
    pub fn new(store: SubscriptionStore, instance: Arc<dyn InstanceApi>) -> Self {
        Self { store, instance }
    }

    /// Subscribe `device_token` to pushes from the account behind
    /// `instance_token` on `raw_instance`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Validation`] for blank tokens or an invalid instance
    /// - [`BridgeError::Registration`] if the instance refused; nothing is stored
    /// - [`BridgeError::Storage`] if the store failed
    pub async fn subscribe(
        &self,
        device_token: &str,
        instance_token: &str,
        raw_instance: &str,
        endpoint_base: &str,
    ) -> Result<Subscribed> {
        let device_token = DeviceToken::new(device_token)?;
        let instance_token = non_blank(instance_token, "instanceToken")?;
        let origin = InstanceOrigin::parse(raw_instance)?;

        if let Some(existing) = self.store.find(&device_token, &origin).await? {
            tracing::info!(
                subscription_id = %existing.id,
                instance = %origin,
                "Reusing existing subscription"
            );
            return Ok(Subscribed {
                id: existing.id,
                reused: true,
            });
        }

        let keys = push_ece::generate()?;
        let id = SubscriptionId::new();
        let endpoint = webhook_url(endpoint_base, &id);
        let registration = PushRegistration::new(&endpoint, &keys.public_key, keys.auth_secret());

        self.instance
            .register(&origin, instance_token, &registration)
            .await
            .map_err(|e| {
                tracing::warn!(instance = %origin, "Instance rejected push registration: {}", e);
                match e {
                    InstanceError::Status { status, body } => BridgeError::Registration {
                        status: Some(status),
                        body,
                    },
                    other => BridgeError::Registration {
                        status: None,
                        body: other.to_string(),
                    },
                }
            })?;

        let record = SubscriptionRecord {
            id,
            device_token,
            instance_origin: origin,
            keys: keys.material,
            created_at: current_timestamp(),
        };

        if let Err(e) = self.store.create_with_index(&record).await {
            tracing::error!(
                subscription_id = %id,
                instance = %record.instance_origin,
                "Registered with instance but failed to persist subscription: {}",
                e
            );
            return Err(e.into());
        }

        tracing::info!(
            subscription_id = %id,
            instance = %record.instance_origin,
            "Subscription created"
        );
        Ok(Subscribed { id, reused: false })
    }

    /// Remove a subscription and deregister it from the instance.
    ///
    /// The instance call is best-effort. Returns once local cleanup is done,
    /// whether or not the subscription existed.
    pub async fn unsubscribe(
        &self,
        raw_id: &str,
        instance_token: &str,
        raw_instance: &str,
    ) -> Result<()> {
        let id: SubscriptionId = raw_id
            .parse()
            .map_err(|_| BridgeError::Validation(format!("invalid subscriptionId {raw_id:?}")))?;
        let instance_token = non_blank(instance_token, "instanceToken")?;
        let origin = InstanceOrigin::parse(raw_instance)?;

        let record = self.store.get(&id).await?;

        if let Err(e) = self.instance.deregister(&origin, instance_token).await {
            tracing::warn!(
                subscription_id = %id,
                instance = %origin,
                "Instance could not delete push subscription, continuing: {}",
                e
            );
        }

        match record {
            Some(record) => self.store.remove(&record).await?,
            None => self.store.delete(&id).await?,
        }

        tracing::info!(subscription_id = %id, instance = %origin, "Subscription deleted");
        Ok(())
    }
}

fn non_blank<'a>(value: &'a str, field: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}
