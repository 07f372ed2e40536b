//! Mock instance for testing.
//!
//! Records every call and lets tests queue failures and notification detail.

use super::{InstanceApi, InstanceError};
use async_trait::async_trait;
use push_types::{InstanceOrigin, NotificationDetail, PushRegistration};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A call observed by [`MockInstance`].
#[derive(Debug, Clone)]
pub enum InstanceCall {
    /// `POST /api/v1/push/subscription`.
    Register {
        /// Instance origin.
        origin: InstanceOrigin,
        /// Bearer token.
        access_token: String,
        /// Request body.
        registration: PushRegistration,
    },
    /// `DELETE /api/v1/push/subscription`.
    Deregister {
        /// Instance origin.
        origin: InstanceOrigin,
        /// Bearer token.
        access_token: String,
    },
    /// `GET /api/v1/notifications/{id}`.
    Notification {
        /// Instance origin.
        origin: InstanceOrigin,
        /// Bearer token.
        access_token: String,
        /// Requested id.
        notification_id: String,
    },
}

/// Mock instance for testing.
///
/// Notifications not added with [`MockInstance::add_notification`] answer 404.
#[derive(Debug, Default)]
pub struct MockInstance {
    inner: Arc<Mutex<MockInstanceInner>>,
}

#[derive(Debug, Default)]
struct MockInstanceInner {
    calls: Vec<InstanceCall>,
    notifications: HashMap<String, NotificationDetail>,
    fail_next_register: Option<(u16, String)>,
    fail_next_deregister: Option<(u16, String)>,
}

impl MockInstance {
    /// Create a new mock instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `detail` for `GET /api/v1/notifications/{id}`.
    pub fn add_notification(&self, id: &str, detail: NotificationDetail) {
        let mut inner = self.inner.lock().unwrap();
        inner.notifications.insert(id.to_string(), detail);
    }

    /// Cause the next register() to fail with the given status and body.
    pub fn fail_next_register(&self, status: u16, body: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_register = Some((status, body.to_string()));
    }

    /// Cause the next deregister() to fail with the given status and body.
    pub fn fail_next_deregister(&self, status: u16, body: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_deregister = Some((status, body.to_string()));
    }

    /// All calls so far.
    pub fn calls(&self) -> Vec<InstanceCall> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }

    /// Registrations so far.
    pub fn registrations(&self) -> Vec<PushRegistration> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                InstanceCall::Register { registration, .. } => Some(registration),
                _ => None,
            })
            .collect()
    }

    /// Number of register() calls.
    pub fn register_count(&self) -> usize {
        self.registrations().len()
    }

    /// Number of deregister() calls.
    pub fn deregister_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, InstanceCall::Deregister { .. }))
            .count()
    }

    /// Clear all state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockInstanceInner::default();
    }
}

impl Clone for MockInstance {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl InstanceApi for MockInstance {
    async fn register(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
        registration: &PushRegistration,
    ) -> Result<(), InstanceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(InstanceCall::Register {
            origin: origin.clone(),
            access_token: access_token.to_string(),
            registration: registration.clone(),
        });

        if let Some((status, body)) = inner.fail_next_register.take() {
            return Err(InstanceError::Status { status, body });
        }
        Ok(())
    }

    async fn deregister(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
    ) -> Result<(), InstanceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(InstanceCall::Deregister {
            origin: origin.clone(),
            access_token: access_token.to_string(),
        });

        if let Some((status, body)) = inner.fail_next_deregister.take() {
            return Err(InstanceError::Status { status, body });
        }
        Ok(())
    }

    async fn notification(
        &self,
        origin: &InstanceOrigin,
        access_token: &str,
        notification_id: &str,
    ) -> Result<NotificationDetail, InstanceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(InstanceCall::Notification {
            origin: origin.clone(),
            access_token: access_token.to_string(),
            notification_id: notification_id.to_string(),
        });

        inner
            .notifications
            .get(notification_id)
            .cloned()
            .ok_or_else(|| InstanceError::Status {
                status: 404,
                body: "{\"error\":\"Record not found\"}".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> InstanceOrigin {
        InstanceOrigin::parse("example.social").unwrap()
    }

    #[tokio::test]
    async fn records_registrations() {
        let mock = MockInstance::new();
        let reg = PushRegistration::new("https://bridge/subscriptions/1", &[4u8; 65], &[1u8; 16]);

        mock.register(&origin(), "tok", &reg).await.unwrap();

        assert_eq!(mock.register_count(), 1);
        assert_eq!(
            mock.registrations()[0].subscription.endpoint,
            "https://bridge/subscriptions/1"
        );
    }

    #[tokio::test]
    async fn fail_next_register_fails_once() {
        let mock = MockInstance::new();
        let reg = PushRegistration::new("https://bridge/subscriptions/1", &[4u8; 65], &[1u8; 16]);
        mock.fail_next_register(422, "invalid");

        assert!(matches!(
            mock.register(&origin(), "tok", &reg).await,
            Err(InstanceError::Status { status: 422, .. })
        ));
        assert!(mock.register(&origin(), "tok", &reg).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_notification_is_404() {
        let mock = MockInstance::new();
        let result = mock.notification(&origin(), "tok", "1").await;
        assert!(matches!(result, Err(InstanceError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let mock = MockInstance::new();
        let clone = mock.clone();
        clone.deregister(&origin(), "tok").await.unwrap();
        assert_eq!(mock.deregister_count(), 1);

        mock.reset();
        assert!(clone.calls().is_empty());
    }
}
