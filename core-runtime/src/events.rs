//! # Event Bus System
//!
//! Broadcasts typed events from the sync orchestrator and the authorization
//! handshake to any number of listeners (UI, telemetry, tests) using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps one enum per domain (`AuthEvent`, `SyncEvent`)
//! - **EventBus**: Cloneable handle to the broadcast channel
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! Publishing never blocks and never fails the publisher: with no
//! subscribers `emit` returns an error that callers drop with `.ok()`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut sync_events = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Sync(_)));
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         batch_id: "batch-1".to_string(),
//!         total: 2,
//!         concurrency: 2,
//!     }))
//!     .ok();
//!
//! let event = sync_events.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync started");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};

/// Default capacity for the event bus buffer.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Account authorization events
    Auth(AuthEvent),
    /// Account sync events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::JobRetrying { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { failed, .. }) if !failed.is_empty() => {
                EventSeverity::Warning
            }
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authorization Events
// ============================================================================

/// Events emitted while binding a new account through a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Authorization surface opened, waiting for the user.
    SigningIn {
        provider: String,
    },
    /// Provider granted access and the account was bound.
    SignedIn {
        provider: String,
        account_id: i64,
        /// Redacted account identifier.
        identifier: Option<String>,
    },
    /// Handshake ended without a usable result.
    AuthError {
        provider: String,
        message: String,
        /// Whether trying again may help (timeout, closed window).
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Authorization in progress",
            AuthEvent::SignedIn { .. } => "Account authorized",
            AuthEvent::AuthError { .. } => "Authorization error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by one sync batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Batch started.
    Started {
        batch_id: String,
        /// Number of account jobs in the batch.
        total: usize,
        /// Worker count actually used.
        concurrency: usize,
    },
    /// Batch state changed.
    Progress {
        batch_id: String,
        completed: usize,
        total: usize,
        /// Labels of jobs in flight, in claim order.
        running: Vec<String>,
        inserted_total: u64,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// A job attempt failed and will be retried.
    JobRetrying {
        batch_id: String,
        account_id: i64,
        label: String,
        /// Retry number, starting at 1.
        attempt: u32,
        max_retries: u32,
        message: String,
    },
    /// Every job in the batch has finished.
    Completed {
        batch_id: String,
        inserted_total: u64,
        /// Labels of jobs that exhausted their retries.
        failed: Vec<String>,
        duration_ms: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::JobRetrying { .. } => "Account sync retrying",
            SyncEvent::Completed { .. } => "Sync completed",
        }
    }

    /// Batch this event belongs to.
    pub fn batch_id(&self) -> &str {
        match self {
            SyncEvent::Started { batch_id, .. }
            | SyncEvent::Progress { batch_id, .. }
            | SyncEvent::JobRetrying { batch_id, .. }
            | SyncEvent::Completed { batch_id, .. } => batch_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber. A
    /// subscriber that falls further behind receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every bus handle is dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Receives without waiting. `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drains every buffered event that passes the filter.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(batch_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Started {
            batch_id: batch_id.to_string(),
            total: 3,
            concurrency: 2,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let event_bus = EventBus::new(10);
        assert!(event_bus.emit(started("b1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let event_bus = EventBus::new(10);
        let mut first = event_bus.subscribe();
        let mut second = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        assert_eq!(event_bus.emit(started("b1")).unwrap(), 2);
        assert_eq!(first.recv().await.unwrap(), started("b1"));
        assert_eq!(second.recv().await.unwrap(), started("b1"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let event_bus = EventBus::new(10);
        let mut stream = EventStream::new(event_bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Auth(_)));

        event_bus.emit(started("b1")).ok();
        event_bus
            .emit(CoreEvent::Auth(AuthEvent::SigningIn {
                provider: "gmail".to_string(),
            }))
            .ok();

        let event = stream.recv().await.unwrap();
        assert!(matches!(event, CoreEvent::Auth(AuthEvent::SigningIn { .. })));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();
        for i in 0..5 {
            event_bus.emit(started(&format!("b{}", i))).ok();
        }
        assert!(matches!(receiver.recv().await, Err(RecvError::Lagged(3))));
    }

    #[tokio::test]
    async fn test_drain_collects_buffered_events() {
        let event_bus = EventBus::new(10);
        let mut stream = EventStream::new(event_bus.subscribe());
        event_bus.emit(started("b1")).ok();
        event_bus.emit(started("b2")).ok();

        let events = stream.drain();
        assert_eq!(events.len(), 2);
        assert!(stream.drain().is_empty());
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::Completed {
            batch_id: "b1".to_string(),
            inserted_total: 3,
            failed: vec!["ada@example.com".to_string()],
            duration_ms: 10,
        });
        assert_eq!(failed.severity(), EventSeverity::Warning);

        let clean = CoreEvent::Sync(SyncEvent::Completed {
            batch_id: "b1".to_string(),
            inserted_total: 3,
            failed: Vec::new(),
            duration_ms: 10,
        });
        assert_eq!(clean.severity(), EventSeverity::Info);

        let error = CoreEvent::Auth(AuthEvent::AuthError {
            provider: "gmail".to_string(),
            message: "timed out".to_string(),
            recoverable: true,
        });
        assert_eq!(error.severity(), EventSeverity::Error);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Sync(SyncEvent::JobRetrying {
            batch_id: "b1".to_string(),
            account_id: 4,
            label: "ada@example.com".to_string(),
            attempt: 1,
            max_retries: 2,
            message: "connection reset".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Sync");
        assert_eq!(json["payload"]["event"], "JobRetrying");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_sync_event_batch_id() {
        if let CoreEvent::Sync(event) = started("b7") {
            assert_eq!(event.batch_id(), "b7");
        }
    }
}
