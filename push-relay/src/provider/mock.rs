//! Mock push provider for testing.
//!
//! Captures sent messages and lets tests force the next send to fail.

use super::{PushError, PushProvider};
use async_trait::async_trait;
use push_types::PushMessage;
use std::sync::{Arc, Mutex};

/// Mock push provider for testing.
#[derive(Debug, Default)]
pub struct MockPushProvider {
    inner: Arc<Mutex<MockPushProviderInner>>,
}

#[derive(Debug, Default)]
struct MockPushProviderInner {
    sent_messages: Vec<PushMessage>,
    attempts: usize,
    fail_next_send: Option<PushError>,
}

impl MockPushProvider {
    /// Create a new mock provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: PushError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error);
    }

    /// Cause the next send() to report the token as unregistered.
    pub fn fail_next_unregistered(&self) {
        self.fail_next_send(PushError::Unregistered);
    }

    /// Messages delivered successfully.
    pub fn sent_messages(&self) -> Vec<PushMessage> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// The last message delivered.
    pub fn last_sent(&self) -> Option<PushMessage> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Number of send() calls, including failed ones.
    pub fn attempts(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.attempts
    }

    /// Clear all state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockPushProviderInner::default();
    }
}

impl Clone for MockPushProvider {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        let mut inner = self.inner.lock().unwrap();
        inner.attempts += 1;

        if let Some(error) = inner.fail_next_send.take() {
            return Err(error);
        }

        inner.sent_messages.push(message.clone());
        Ok(format!("projects/mock/messages/{}", inner.sent_messages.len()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn message() -> PushMessage {
        PushMessage {
            token: "tok".into(),
            title: "t".into(),
            body: "b".into(),
            data: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn captures_messages() {
        let mock = MockPushProvider::new();
        let name = mock.send(&message()).await.unwrap();

        assert_eq!(name, "projects/mock/messages/1");
        assert_eq!(mock.last_sent().unwrap().token, "tok");
    }

    #[tokio::test]
    async fn forced_failure_is_one_shot() {
        let mock = MockPushProvider::new();
        mock.fail_next_unregistered();

        assert!(mock.send(&message()).await.unwrap_err().is_unregistered());
        assert!(mock.send(&message()).await.is_ok());
        assert_eq!(mock.attempts(), 2);
        assert_eq!(mock.sent_messages().len(), 1);
    }
}
