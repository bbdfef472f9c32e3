use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::models::Identity;
use crate::services::store::ProfileRepository;
use crate::services::telegram::Messenger;

/// Rewrite an observer-facing introduction for the matched party.
///
/// The matched party is addressed directly, so `@observer` reads as "They"
/// and `@matched` as "you".
pub fn render_notification(matched: &str, observer: &str, post: &str) -> String {
    let mut handles = [(format!("@{}", observer), "They"), (format!("@{}", matched), "you")];
    // Longer handle first so "@al" never clobbers "@alice"
    handles.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let rewritten = handles
        .iter()
        .fold(post.to_string(), |text, (handle, with)| text.replace(handle.as_str(), with));

    format!(
        "Hello @{matched}! \n\n\
         I just connected you with @{observer} who was looking for someone with your expertise. \
         They'll probably reach out to you soon.\n\n\
         Here's what I told them about you:\n\
         ----------\n\
         {rewritten}\n\
         ----------\n\n\
         Good luck with the connection!"
    )
}

/// Delivers introductions to the matched party through the front end
#[derive(Clone)]
pub struct NotificationDispatcher {
    repo: Arc<dyn ProfileRepository>,
    messenger: Arc<dyn Messenger>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        repo: Arc<dyn ProfileRepository>,
        messenger: Arc<dyn Messenger>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            messenger,
            timeout,
        }
    }

    /// Returns whether the message was delivered. Never fails: a missing
    /// address, a store error or a delivery error all yield `false`.
    pub async fn notify(&self, matched: &Identity, observer: &Identity, introduction: &str) -> bool {
        let address = match self.repo.resolved_address(matched).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                tracing::info!("No delivery address on file for {}", matched);
                return false;
            }
            Err(e) => {
                tracing::error!("Failed to resolve address for {}: {}", matched, e);
                return false;
            }
        };

        let text = render_notification(&matched.username, &observer.username, introduction);

        match timeout(
            self.timeout,
            self.messenger
                .send_message(&matched.platform, &address, &text),
        )
        .await
        {
            Ok(Ok(delivered)) => {
                if delivered {
                    tracing::info!("Notified {} about match with {}", matched, observer);
                } else {
                    tracing::info!("No delivery channel for {}", matched);
                }
                delivered
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to notify {}: {}", matched, e);
                false
            }
            Err(_) => {
                tracing::error!("Notification to {} timed out after {:?}", matched, self.timeout);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryAddress;
    use crate::services::memory::InMemoryStore;
    use crate::services::telegram::DeliveryError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(
            &self,
            platform: &str,
            address: &DeliveryAddress,
            text: &str,
        ) -> Result<bool, DeliveryError> {
            if self.fail {
                return Err(DeliveryError::ApiError("blocked".to_string()));
            }
            self.sent.lock().await.push((
                platform.to_string(),
                address.chat_id.clone(),
                text.to_string(),
            ));
            Ok(true)
        }
    }

    #[test]
    fn test_render_rewrites_perspective() {
        let text = render_notification(
            "bob",
            "alice",
            "@alice, meet @bob! @alice builds apps and @bob markets them.",
        );
        assert!(text.starts_with("Hello @bob! "));
        assert!(text.contains("connected you with @alice"));
        assert!(text.contains("They, meet you! They builds apps and you markets them."));
        assert!(text.ends_with("Good luck with the connection!"));
    }

    #[tokio::test]
    async fn test_missing_address_returns_false() {
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(InMemoryStore::new()),
            messenger.clone(),
            Duration::from_secs(1),
        );

        let delivered = dispatcher
            .notify(&Identity::new("telegram", "bob"), &Identity::new("telegram", "alice"), "hi")
            .await;

        assert!(!delivered);
        assert!(messenger.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_delivers_to_resolved_address() {
        let store = Arc::new(InMemoryStore::new());
        let bob = Identity::new("telegram", "bob");
        store
            .set_resolved_address(
                &bob,
                &DeliveryAddress {
                    chat_id: "77".to_string(),
                    agent_username: None,
                },
            )
            .await
            .unwrap();

        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher =
            NotificationDispatcher::new(store.clone(), messenger.clone(), Duration::from_secs(1));

        assert!(dispatcher.notify(&bob, &Identity::new("telegram", "alice"), "Meet @bob").await);

        let sent = messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "77");
        assert!(sent[0].2.contains("Meet you"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let store = Arc::new(InMemoryStore::new());
        let bob = Identity::new("telegram", "bob");
        store
            .set_resolved_address(
                &bob,
                &DeliveryAddress {
                    chat_id: "77".to_string(),
                    agent_username: None,
                },
            )
            .await
            .unwrap();

        let messenger = Arc::new(RecordingMessenger {
            fail: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(store, messenger, Duration::from_secs(1));

        assert!(!dispatcher.notify(&bob, &Identity::new("telegram", "alice"), "hi").await);
    }
}
