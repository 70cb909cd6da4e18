//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (account API,
//! authorization surface, message channel) into the inbox core. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and call [`bootstrap_desktop`].

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::{CoreConfig, HandshakeSettings, SyncSettings};
pub use core_runtime::events::{AuthEvent, CoreEvent, EventStream, SyncEvent};
pub use core_sync::{BatchSummary, BindOutcome, ProgressSnapshot};

use bridge_traits::{Account, ProviderKind};
use core_auth::HandshakeChannel;
use core_runtime::events::EventBus;
use core_sync::SyncOrchestrator;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::LocalMessageChannel;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<Inner>,
}

struct Inner {
    orchestrator: SyncOrchestrator,
    event_bus: EventBus,
    supports_binding: bool,
}

impl CoreService {
    /// Create a new service from a validated configuration.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer);
        let supports_binding = config.supports_binding();
        let mut orchestrator = SyncOrchestrator::new(
            Arc::clone(&config.account_service),
            config.sync.clone(),
            event_bus.clone(),
        );

        if let (Some(launcher), Some(channel)) = (config.surface_launcher, config.message_channel) {
            let handshake = HandshakeChannel::new(
                Arc::clone(&config.account_service),
                launcher,
                channel,
                config.handshake,
            )
            .with_event_bus(event_bus.clone());
            orchestrator = orchestrator.with_handshake(handshake);
        }

        info!(
            concurrency = config.sync.concurrency,
            supports_binding, "Core service initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                orchestrator,
                event_bus,
                supports_binding,
            }),
        })
    }

    /// Whether [`bind_account`](Self::bind_account) can run.
    pub fn supports_binding(&self) -> bool {
        self.inner.supports_binding
    }

    pub fn sync_settings(&self) -> &SyncSettings {
        self.inner.orchestrator.settings()
    }

    /// Sync every connected account.
    pub async fn sync_all(&self) -> Result<BatchSummary> {
        Ok(self.inner.orchestrator.sync_all().await?)
    }

    /// Sync `accounts`; an empty list syncs a freshly created demo account.
    pub async fn run_batch(&self, accounts: Vec<Account>, concurrency: usize) -> Result<BatchSummary> {
        Ok(self.inner.orchestrator.run_batch(accounts, concurrency).await?)
    }

    pub async fn run_batch_observed<F>(
        &self,
        accounts: Vec<Account>,
        concurrency: usize,
        observer: F,
    ) -> Result<BatchSummary>
    where
        F: FnMut(&ProgressSnapshot),
    {
        Ok(self
            .inner
            .orchestrator
            .run_batch_observed(accounts, concurrency, observer)
            .await?)
    }

    /// Bind and sync a new account. The authorization surface opens before
    /// this returns.
    pub fn bind_account(
        &self,
        provider: ProviderKind,
    ) -> impl Future<Output = Result<BindOutcome>> + '_ {
        let pending = self.inner.orchestrator.bind_account(provider);
        async move { Ok(pending.await?) }
    }

    /// Subscribe to sync and authorization events.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.inner.event_bus.subscribe())
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Settings come from the `INBOX_*` environment variables. Authorization
/// opens the system browser; the host posts the redirect page's result to
/// the returned channel.
///
/// ```ignore
/// use core_service::bootstrap_desktop;
///
/// # async fn example(api: std::sync::Arc<dyn bridge_traits::AccountService>) -> core_service::Result<()> {
/// let (core, channel) = bootstrap_desktop(api)?;
/// let summary = core.sync_all().await?;
/// println!("{}", summary.message);
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(
    account_service: Arc<dyn bridge_traits::AccountService>,
) -> Result<(CoreService, LocalMessageChannel)> {
    let channel = LocalMessageChannel::new();
    let config = CoreConfig::builder()
        .account_service(account_service)
        .message_channel(Arc::new(channel.clone()))
        .sync_settings(SyncSettings::from_env()?)
        .handshake_settings(HandshakeSettings::from_env()?)
        .build()?;

    Ok((CoreService::new(config)?, channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        AccountId, AccountService, AuthSurface, AuthorizationStart, NewAccount, SurfaceLauncher,
        SyncReport,
    };
    use mockall::mock;

    mock! {
        pub Accounts {}

        #[async_trait]
        impl AccountService for Accounts {
            async fn list_accounts(&self) -> BridgeResult<Vec<Account>>;
            async fn create_account(&self, account: NewAccount) -> BridgeResult<Account>;
            async fn sync_account(&self, id: AccountId) -> BridgeResult<SyncReport>;
            async fn start_authorization(&self, provider: ProviderKind) -> BridgeResult<AuthorizationStart>;
        }
    }

    struct NullLauncher;

    impl SurfaceLauncher for NullLauncher {
        fn open(&self) -> BridgeResult<Box<dyn AuthSurface>> {
            Err(bridge_traits::BridgeError::NotAvailable("headless".to_string()))
        }
    }

    fn account(id: i64) -> Account {
        Account {
            id: AccountId(id),
            provider: "gmail".to_string(),
            identifier: format!("user{}@example.com", id),
            display_name: None,
            demo: false,
        }
    }

    fn service_with(accounts: MockAccounts) -> CoreService {
        let config = CoreConfig::builder()
            .account_service(Arc::new(accounts))
            .build()
            .unwrap();
        CoreService::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_sync_all_reports_summary_and_events() {
        let mut accounts = MockAccounts::new();
        accounts
            .expect_list_accounts()
            .returning(|| Ok(vec![account(1), account(2)]));
        accounts
            .expect_sync_account()
            .times(2)
            .returning(|id| Ok(SyncReport { inserted: id.value() as u64 }));

        let core = service_with(accounts);
        let mut events = core.subscribe_events();

        let summary = core.sync_all().await.unwrap();
        assert_eq!(summary.inserted_total, 3);
        assert_eq!(summary.message, "Synced 3 new messages from 2 accounts");

        let events = events.drain();
        assert!(matches!(
            events.first(),
            Some(CoreEvent::Sync(SyncEvent::Started { total: 2, .. }))
        ));
        assert!(matches!(
            events.last(),
            Some(CoreEvent::Sync(SyncEvent::Completed { inserted_total: 3, .. }))
        ));
    }

    #[tokio::test]
    async fn test_bind_without_bridges_is_unavailable() {
        let core = service_with(MockAccounts::new());

        assert!(!core.supports_binding());
        let err = core.bind_account(ProviderKind::Gmail).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Sync(core_sync::SyncError::BindingUnavailable)
        ));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_launcher_without_channel_is_rejected() {
        let result = CoreConfig::builder()
            .account_service(Arc::new(MockAccounts::new()))
            .surface_launcher(Arc::new(NullLauncher))
            .build();

        assert!(matches!(
            result,
            Err(core_runtime::Error::CapabilityMissing { ref capability, .. }) if capability == "MessageChannel"
        ));
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_blocked_surface_surfaces_as_auth_error() {
        let config = CoreConfig::builder()
            .account_service(Arc::new(MockAccounts::new()))
            .surface_launcher(Arc::new(NullLauncher))
            .message_channel(Arc::new(LocalMessageChannel::new()))
            .build()
            .unwrap();
        let core = CoreService::new(config).unwrap();

        assert!(core.supports_binding());
        let err = core.bind_account(ProviderKind::Outlook).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Sync(core_sync::SyncError::Auth(core_auth::AuthError::SurfaceBlocked(_)))
        ));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(CoreError::Auth(core_auth::AuthError::Closed).is_recoverable());
        assert!(CoreError::Sync(core_sync::SyncError::AccountListing("503".to_string()))
            .is_recoverable());
        assert!(!CoreError::Sync(core_sync::SyncError::DemoAccountCreation(
            "disk full".to_string()
        ))
        .is_recoverable());
    }
}
