//! Cross-Origin Message Channel
//!
//! Inbound messages posted to the application by other browsing contexts or
//! by a local redirect listener. Every message carries the origin it was sent
//! from and an untrusted JSON payload; filtering is the subscriber's job.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A message delivered to the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Serialized origin of the sender (`scheme://host[:port]`)
    pub origin: String,
    pub data: serde_json::Value,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// One registered listener on a [`MessageChannel`]
///
/// The listener stays registered until [`close`](MessageSubscription::close)
/// is called or the subscription is dropped, whichever happens first.
pub struct MessageSubscription {
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    unsubscribe: Option<Unsubscribe>,
}

impl MessageSubscription {
    /// Wrap a receiver; `unsubscribe` runs exactly once when the listener is
    /// removed.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<InboundMessage>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Wait for the next message
    ///
    /// Returns `None` once the subscription is closed or the channel has shut
    /// down.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        if self.unsubscribe.is_none() {
            return None;
        }
        self.receiver.recv().await
    }

    /// Remove the listener. Idempotent.
    pub fn close(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            self.receiver.close();
            unsubscribe();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.unsubscribe.is_none()
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MessageSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSubscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Source of inbound messages
pub trait MessageChannel: Send + Sync {
    /// Register a listener for every message posted from now on
    fn subscribe(&self) -> MessageSubscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_subscription_receives_until_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let removed = Arc::new(AtomicUsize::new(0));
        let counter = removed.clone();
        let mut subscription = MessageSubscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(InboundMessage::new("https://app.example", serde_json::json!({"ok": true})))
            .unwrap();
        let message = subscription.recv().await.unwrap();
        assert_eq!(message.origin, "https://app.example");

        subscription.close();
        subscription.close();
        assert!(subscription.is_closed());
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert!(subscription.recv().await.is_none());
    }

    #[test]
    fn test_drop_unsubscribes_once() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let removed = Arc::new(AtomicUsize::new(0));
        let counter = removed.clone();
        {
            let mut subscription = MessageSubscription::new(rx, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            subscription.close();
        }
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }
}
