//! In-process message channel.

use bridge_traits::{InboundMessage, MessageChannel, MessageSubscription};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<InboundMessage>>,
}

/// Fan-out hub for messages posted inside the desktop process.
///
/// The desktop shell posts whatever its redirect listener or embedded web
/// view receives, tagged with the sender's origin. Every live subscription
/// gets a copy.
#[derive(Clone, Default)]
pub struct LocalMessageChannel {
    registry: Arc<Mutex<Registry>>,
}

impl LocalMessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every current subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn post(&self, origin: impl Into<String>, data: serde_json::Value) -> usize {
        let message = InboundMessage::new(origin, data);
        let mut registry = self.lock();

        registry
            .subscribers
            .retain(|_, sender| sender.send(message.clone()).is_ok());

        let delivered = registry.subscribers.len();
        trace!(origin = %message.origin, delivered, "Posted message");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageChannel for LocalMessageChannel {
    fn subscribe(&self) -> MessageSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();

        let id = {
            let mut registry = self.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscribers.insert(id, sender);
            id
        };
        debug!(subscription = id, "Message listener added");

        let registry = Arc::clone(&self.registry);
        MessageSubscription::new(receiver, move || {
            registry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .subscribers
                .remove(&id);
            debug!(subscription = id, "Message listener removed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_post_fans_out_to_subscribers() {
        let channel = LocalMessageChannel::new();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        assert_eq!(channel.post("https://app.example", json!({"ok": true})), 2);

        assert_eq!(first.recv().await.unwrap().origin, "https://app.example");
        assert_eq!(second.recv().await.unwrap().data, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_closed_subscription_is_removed() {
        let channel = LocalMessageChannel::new();
        let mut subscription = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);

        subscription.close();
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.post("https://app.example", json!(null)), 0);
    }

    #[test]
    fn test_dropped_subscription_is_removed() {
        let channel = LocalMessageChannel::new();
        drop(channel.subscribe());
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_post_without_subscribers() {
        let channel = LocalMessageChannel::new();
        assert_eq!(channel.post("https://app.example", json!({})), 0);
    }
}
