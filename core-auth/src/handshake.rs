//! # Authorization Handshake
//!
//! Binds a new mail account by sending the user through the provider's
//! consent screen in an external surface and waiting for the redirect page to
//! post the outcome back over the message channel.
//!
//! ## Flow
//!
//! 1. **Opening** - the surface is opened synchronously when [`HandshakeChannel::begin`]
//!    is called, so hosts that only allow popups during a user gesture accept it.
//! 2. **AwaitingAuth** - the account service returns the authorization URL. The
//!    expected origin is derived from its redirect target and the surface is
//!    navigated there.
//! 3. **AwaitingMessage** - the first qualifying message resolves the handshake.
//!    Meanwhile the surface is polled for closure (with a debounce window for a
//!    result already in flight) and an overall timeout runs.
//!
//! Exactly one of message, closure, timeout or cancellation settles the
//! handshake. Whichever comes first tears down the listener and timers; the
//! rest are ignored.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::HandshakeChannel;
//! use bridge_traits::ProviderKind;
//!
//! let handshake = HandshakeChannel::new(accounts, launcher, messages, settings);
//!
//! // Inside the click handler: the surface opens before this line returns.
//! let pending = handshake.begin(ProviderKind::Gmail);
//! let authorized = pending.await?;
//! let (account_id, identifier) = authorized.account()?;
//! ```

use bridge_traits::{
    AccountService, InboundMessage, MessageChannel, MessageSubscription, ProviderKind,
    SurfaceLauncher,
};
use core_runtime::config::HandshakeSettings;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::{redact_if_sensitive, strip_query};
use std::collections::HashSet;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{AuthError, Result};
use crate::origin::{expected_origin, origin_allowed};
use crate::surface::SurfaceHandle;
use crate::types::{
    AuthorizationRequest, AuthorizationResult, Authorized, HandshakeMessage, HandshakeState,
};

/// Runs authorization handshakes against one set of host bridges.
pub struct HandshakeChannel {
    accounts: Arc<dyn AccountService>,
    launcher: Arc<dyn SurfaceLauncher>,
    messages: Arc<dyn MessageChannel>,
    settings: HandshakeSettings,
    event_bus: Option<EventBus>,
    in_progress: Arc<Mutex<HashSet<ProviderKind>>>,
}

impl HandshakeChannel {
    pub fn new(
        accounts: Arc<dyn AccountService>,
        launcher: Arc<dyn SurfaceLauncher>,
        messages: Arc<dyn MessageChannel>,
        settings: HandshakeSettings,
    ) -> Self {
        Self {
            accounts,
            launcher,
            messages,
            settings,
            event_bus: None,
            in_progress: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Publish `AuthEvent`s on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &HandshakeSettings {
        &self.settings
    }

    /// Start a handshake for `provider`.
    ///
    /// The surface is opened before this returns; the returned future drives
    /// the rest of the flow. Opening failures (`SurfaceBlocked`, `InProgress`)
    /// surface when the future is awaited.
    pub fn begin(
        &self,
        provider: ProviderKind,
    ) -> impl Future<Output = Result<Authorized>> + Send + '_ {
        self.begin_with_cancel(provider, CancellationToken::new())
    }

    /// Like [`begin`](Self::begin), additionally rejecting with
    /// `AuthError::Cancelled` once `cancel` fires.
    pub fn begin_with_cancel(
        &self,
        provider: ProviderKind,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Authorized>> + Send + '_ {
        let opened = self.open(provider);

        async move {
            let result = match opened {
                Ok((surface, _guard)) => self.authorize(provider, surface, cancel).await,
                Err(e) => Err(e),
            };
            self.publish_outcome(provider, &result);
            result
        }
    }

    fn open(&self, provider: ProviderKind) -> Result<(SurfaceHandle, InProgressGuard)> {
        let guard = InProgressGuard::acquire(&self.in_progress, provider)?;

        let surface = self.launcher.open().map_err(|e| {
            warn!(provider = %provider, error = %e, "Authorization surface blocked");
            AuthError::SurfaceBlocked(e.to_string())
        })?;

        debug!(
            provider = %provider,
            state = %HandshakeState::Opening,
            "Authorization surface opened"
        );
        Ok((SurfaceHandle::new(surface), guard))
    }

    #[instrument(skip(self, surface, cancel), fields(provider = %provider))]
    async fn authorize(
        &self,
        provider: ProviderKind,
        surface: SurfaceHandle,
        cancel: CancellationToken,
    ) -> Result<Authorized> {
        self.emit(AuthEvent::SigningIn {
            provider: provider.to_string(),
        });

        debug!(state = %HandshakeState::AwaitingAuth, "Requesting authorization URL");

        // Dropping `surface` on any early return closes it.
        let start = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Handshake cancelled during setup");
                return Err(AuthError::Cancelled);
            }
            start = self.accounts.start_authorization(provider) => start.map_err(|e| {
                warn!(error = %e, "Failed to start authorization");
                AuthError::AuthorizationSetup {
                    provider: provider.to_string(),
                    reason: e.to_string(),
                }
            })?,
        };

        let allowed_origin = expected_origin(&start.auth_url);
        if allowed_origin.is_none() {
            warn!(
                auth_url = %strip_query(&start.auth_url),
                "No redirect target in authorization URL, accepting results from any origin"
            );
        }

        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        // Listen before navigating so a fast redirect cannot slip past.
        let subscription = self.messages.subscribe();

        surface
            .navigate(&start.auth_url)
            .map_err(|e| AuthError::Navigation(e.to_string()))?;

        info!(
            auth_url = %strip_query(&start.auth_url),
            allowed_origin = ?allowed_origin,
            "Waiting for authorization result"
        );

        let request = AuthorizationRequest {
            provider,
            surface,
            allowed_origin,
            source_tag: self.settings.source_tag.clone(),
            timeout: self.settings.timeout,
        };

        HandshakeSession::new(request, subscription, &self.settings)
            .run(cancel)
            .await
    }

    fn publish_outcome(&self, provider: ProviderKind, result: &Result<Authorized>) {
        let event = match result {
            Ok(authorized) => match authorized.account() {
                Ok((account_id, identifier)) => {
                    let identifier =
                        identifier.map(|value| redact_if_sensitive("identifier", &value));
                    info!(
                        provider = %provider,
                        account_id = %account_id,
                        identifier = ?identifier,
                        "Authorization completed"
                    );
                    AuthEvent::SignedIn {
                        provider: provider.to_string(),
                        account_id: account_id.value(),
                        identifier,
                    }
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "Authorization returned no account");
                    AuthEvent::AuthError {
                        provider: provider.to_string(),
                        message: e.to_string(),
                        recoverable: e.is_recoverable(),
                    }
                }
            },
            Err(e) => {
                warn!(provider = %provider, error = %e, "Authorization failed");
                AuthEvent::AuthError {
                    provider: provider.to_string(),
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                }
            }
        };
        self.emit(event);
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(event_bus) = &self.event_bus {
            event_bus.emit(CoreEvent::Auth(event)).ok();
        }
    }
}

/// Marks a provider as having a handshake in flight until dropped.
struct InProgressGuard {
    providers: Arc<Mutex<HashSet<ProviderKind>>>,
    provider: ProviderKind,
}

impl InProgressGuard {
    fn acquire(providers: &Arc<Mutex<HashSet<ProviderKind>>>, provider: ProviderKind) -> Result<Self> {
        let mut active = providers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(provider) {
            warn!(provider = %provider, "Authorization already in progress for provider");
            return Err(AuthError::InProgress {
                provider: provider.to_string(),
            });
        }

        Ok(Self {
            providers: Arc::clone(providers),
            provider,
        })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        let mut active = self
            .providers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.provider);
    }
}

/// Timers owned by one handshake. Dropped on settlement.
struct HandshakeTimers {
    deadline: Option<Pin<Box<Sleep>>>,
    close_poll: Option<Interval>,
    debounce: Option<Pin<Box<Sleep>>>,
    debounce_window: Duration,
}

impl HandshakeTimers {
    fn start(timeout: Duration, settings: &HandshakeSettings) -> Self {
        // Interval panics on a zero period.
        let period = settings.close_poll_interval.max(Duration::from_millis(1));
        let mut close_poll = interval_at(Instant::now() + period, period);
        close_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            deadline: Some(Box::pin(sleep(timeout))),
            close_poll: Some(close_poll),
            debounce: None,
            debounce_window: settings.close_debounce,
        }
    }

    /// Closure seen: stop polling and start the grace period once.
    fn arm_debounce(&mut self) {
        if self.debounce.is_none() {
            self.close_poll = None;
            self.debounce = Some(Box::pin(sleep(self.debounce_window)));
        }
    }

    fn cancel(&mut self) {
        self.deadline = None;
        self.close_poll = None;
        self.debounce = None;
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.deadline.is_some() || self.close_poll.is_some() || self.debounce.is_some()
    }
}

async fn wait_sleep(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

async fn wait_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn next_message(subscription: &mut Option<MessageSubscription>) -> Option<InboundMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => pending().await,
    }
}

/// State of one handshake in `AwaitingMessage`, with its settle-once guard.
struct HandshakeSession {
    request: AuthorizationRequest,
    subscription: Option<MessageSubscription>,
    timers: HandshakeTimers,
    state: HandshakeState,
    outcome: Option<Result<AuthorizationResult>>,
}

impl HandshakeSession {
    fn new(
        request: AuthorizationRequest,
        subscription: MessageSubscription,
        settings: &HandshakeSettings,
    ) -> Self {
        let timers = HandshakeTimers::start(request.timeout, settings);
        Self {
            request,
            subscription: Some(subscription),
            timers,
            state: HandshakeState::AwaitingMessage,
            outcome: None,
        }
    }

    async fn run(mut self, cancel: CancellationToken) -> Result<Authorized> {
        loop {
            // Messages win ties against closure and timeout.
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.settle(Err(AuthError::Cancelled));
                }
                message = next_message(&mut self.subscription) => match message {
                    Some(message) => {
                        if let Some(result) = self.accept(&message) {
                            self.settle(Ok(result));
                        }
                    }
                    None => {
                        debug!("Message channel shut down, waiting for closure or timeout");
                        self.subscription = None;
                    }
                },
                _ = wait_sleep(&mut self.timers.debounce) => {
                    self.settle(Err(AuthError::Closed));
                }
                _ = wait_tick(&mut self.timers.close_poll) => {
                    if self.request.surface.is_closed() {
                        debug!(
                            debounce_ms = self.timers.debounce_window.as_millis() as u64,
                            "Authorization surface closed, waiting for late result"
                        );
                        self.timers.arm_debounce();
                    }
                }
                _ = wait_sleep(&mut self.timers.deadline) => {
                    let after = self.request.timeout;
                    self.settle(Err(AuthError::Timeout { after }));
                }
            }

            if let Some(outcome) = self.outcome.take() {
                return self.finish(outcome);
            }
        }
    }

    /// The result carried by `message`, if it may settle this handshake.
    fn accept(&self, message: &InboundMessage) -> Option<AuthorizationResult> {
        let parsed = match serde_json::from_value::<HandshakeMessage>(message.data.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!(
                    origin = %message.origin,
                    error = %e,
                    "Ignoring message that is not a handshake result"
                );
                return None;
            }
        };

        if parsed.source != self.request.source_tag {
            trace!(origin = %message.origin, "Ignoring message without handshake source tag");
            return None;
        }

        if !origin_allowed(self.request.allowed_origin.as_deref(), &message.origin) {
            debug!(
                origin = %message.origin,
                expected = ?self.request.allowed_origin,
                "Ignoring handshake message from unexpected origin"
            );
            return None;
        }

        Some(parsed.result)
    }

    /// Settle the handshake. Returns `false`, changing nothing, if it already
    /// settled.
    fn settle(&mut self, outcome: Result<AuthorizationResult>) -> bool {
        if self.state.is_terminal() {
            debug!(state = %self.state, "Handshake already settled, ignoring");
            return false;
        }

        let rejected = outcome.is_err();
        self.state = if rejected {
            HandshakeState::Rejected
        } else {
            HandshakeState::Resolved
        };
        self.teardown(rejected);
        self.outcome = Some(outcome);
        true
    }

    fn teardown(&mut self, close_surface: bool) {
        self.timers.cancel();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        if close_surface {
            self.request.surface.close();
        }
    }

    fn finish(self, outcome: Result<AuthorizationResult>) -> Result<Authorized> {
        let AuthorizationRequest {
            provider, surface, ..
        } = self.request;

        outcome.map(|result| Authorized {
            provider,
            result,
            surface,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::AuthSurface;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const ORIGIN: &str = "https://app.example";

    #[derive(Default)]
    struct SurfaceRecorder {
        closed: AtomicBool,
        close_calls: AtomicUsize,
    }

    struct RecordingSurface(Arc<SurfaceRecorder>);

    impl AuthSurface for RecordingSurface {
        fn navigate(&self, _url: &str) -> BridgeResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.0.closed.load(Ordering::SeqCst)
        }

        fn close(&self) {
            self.0.close_calls.fetch_add(1, Ordering::SeqCst);
            self.0.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Fixture {
        session: HandshakeSession,
        recorder: Arc<SurfaceRecorder>,
        unsubscribed: Arc<AtomicUsize>,
        sender: mpsc::UnboundedSender<InboundMessage>,
    }

    fn fixture(allowed_origin: Option<&str>) -> Fixture {
        let settings = HandshakeSettings::default();
        let recorder = Arc::new(SurfaceRecorder::default());
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unsubscribed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = MessageSubscription::new(receiver, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let request = AuthorizationRequest {
            provider: ProviderKind::Gmail,
            surface: SurfaceHandle::new(Box::new(RecordingSurface(Arc::clone(&recorder)))),
            allowed_origin: allowed_origin.map(str::to_string),
            source_tag: settings.source_tag.clone(),
            timeout: settings.timeout,
        };

        Fixture {
            session: HandshakeSession::new(request, subscription, &settings),
            recorder,
            unsubscribed,
            sender,
        }
    }

    fn success() -> AuthorizationResult {
        AuthorizationResult {
            ok: true,
            account_id: Some(bridge_traits::AccountId(5)),
            identifier: Some("ada@example.com".to_string()),
            error: None,
            provider: Some("gmail".to_string()),
        }
    }

    fn message(origin: &str, source: &str) -> InboundMessage {
        InboundMessage::new(
            origin,
            serde_json::json!({ "source": source, "ok": true, "accountId": 5 }),
        )
    }

    #[tokio::test]
    async fn test_resolve_then_reject_is_ignored() {
        let mut fx = fixture(Some(ORIGIN));

        assert!(fx.session.settle(Ok(success())));
        assert!(!fx.session.settle(Err(AuthError::Closed)));
        assert!(!fx.session.settle(Err(AuthError::Timeout {
            after: Duration::from_secs(1)
        })));

        assert_eq!(fx.session.state, HandshakeState::Resolved);
        assert!(matches!(fx.session.outcome, Some(Ok(_))));
        assert!(!fx.session.timers.is_active());
        assert_eq!(fx.unsubscribed.load(Ordering::SeqCst), 1);
        // The caller owns the surface after a success.
        assert_eq!(fx.recorder.close_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reject_then_resolve_is_ignored() {
        let mut fx = fixture(Some(ORIGIN));

        assert!(fx.session.settle(Err(AuthError::Timeout {
            after: Duration::from_secs(120)
        })));
        assert!(!fx.session.settle(Ok(success())));

        assert_eq!(fx.session.state, HandshakeState::Rejected);
        assert!(matches!(
            fx.session.outcome,
            Some(Err(AuthError::Timeout { .. }))
        ));
        assert!(fx.session.subscription.is_none());
        assert_eq!(fx.unsubscribed.load(Ordering::SeqCst), 1);
        assert_eq!(fx.recorder.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accept_filters_source_and_origin() {
        let fx = fixture(Some(ORIGIN));

        assert!(fx.session.accept(&message(ORIGIN, "sender-inbox-oauth")).is_some());
        assert!(fx
            .session
            .accept(&message("https://evil.example", "sender-inbox-oauth"))
            .is_none());
        assert!(fx.session.accept(&message(ORIGIN, "other-widget")).is_none());
        assert!(fx
            .session
            .accept(&InboundMessage::new(ORIGIN, serde_json::json!("hello")))
            .is_none());
        assert!(fx
            .session
            .accept(&InboundMessage::new(
                ORIGIN,
                serde_json::json!({ "source": "sender-inbox-oauth", "ok": "yes" })
            ))
            .is_none());
        assert!(fx
            .session
            .accept(&InboundMessage::new(
                ORIGIN,
                serde_json::json!({ "source": 7, "ok": true, "accountId": 42 })
            ))
            .is_none());
    }

    #[tokio::test]
    async fn test_accept_any_origin_without_expectation() {
        let fx = fixture(None);

        assert!(fx
            .session
            .accept(&message("https://anywhere.example", "sender-inbox-oauth"))
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ignores_unqualified_then_resolves() {
        let fx = fixture(Some(ORIGIN));
        fx.sender
            .send(message("https://evil.example", "sender-inbox-oauth"))
            .unwrap();
        fx.sender.send(message(ORIGIN, "sender-inbox-oauth")).unwrap();

        let authorized = fx.session.run(CancellationToken::new()).await.unwrap();

        assert_eq!(authorized.result.account_id, Some(bridge_traits::AccountId(5)));
        assert_eq!(fx.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rejects_on_cancel() {
        let fx = fixture(Some(ORIGIN));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fx.session.run(cancel).await.unwrap_err();

        assert!(matches!(err, AuthError::Cancelled));
        assert_eq!(fx.recorder.close_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_in_progress_guard_releases_on_drop() {
        let providers = Arc::new(Mutex::new(HashSet::new()));

        let guard = InProgressGuard::acquire(&providers, ProviderKind::Gmail).unwrap();
        assert!(matches!(
            InProgressGuard::acquire(&providers, ProviderKind::Gmail),
            Err(AuthError::InProgress { .. })
        ));
        assert!(InProgressGuard::acquire(&providers, ProviderKind::Outlook).is_ok());

        drop(guard);
        assert!(InProgressGuard::acquire(&providers, ProviderKind::Gmail).is_ok());
    }
}
