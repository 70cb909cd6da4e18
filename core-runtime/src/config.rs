//! # Core Configuration Module
//!
//! Provides configuration management for the inbox core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and the tuning knobs for account sync
//! and the authorization handshake. It enforces fail-fast validation so a
//! missing bridge is reported at startup, not on the first user click.
//!
//! ## Required Dependencies
//!
//! - `AccountService` - The remote account/message API
//!
//! ## Optional Dependencies
//!
//! - `SurfaceLauncher` - Opens the authorization window (desktop default: system browser)
//! - `MessageChannel` - Delivers the authorization result back to the app
//!
//! Binding new accounts needs both a launcher and a message channel. Without
//! them the core can still sync already connected accounts.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .account_service(Arc::new(MyAccountService))
//!     .message_channel(Arc::new(MyMessageChannel))
//!     .sync_settings(SyncSettings::from_env()?)
//!     .build()?;
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `INBOX_SYNC_CONCURRENCY` | `SyncSettings::concurrency` (floored, at least 1) |
//! | `INBOX_SYNC_MAX_RETRIES` | `SyncSettings::max_retries` |
//! | `INBOX_SYNC_RETRY_DELAY_MS` | `SyncSettings::retry_base_delay` |
//! | `INBOX_AUTH_TIMEOUT_SECS` | `HandshakeSettings::timeout` |
//! | `INBOX_AUTH_POLL_INTERVAL_MS` | `HandshakeSettings::close_poll_interval` |
//! | `INBOX_AUTH_CLOSE_DEBOUNCE_MS` | `HandshakeSettings::close_debounce` |

use crate::error::{Error, Result};
use bridge_traits::{AccountService, MessageChannel, SurfaceLauncher};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_SYNC_CONCURRENCY: &str = "INBOX_SYNC_CONCURRENCY";
pub const ENV_SYNC_MAX_RETRIES: &str = "INBOX_SYNC_MAX_RETRIES";
pub const ENV_SYNC_RETRY_DELAY_MS: &str = "INBOX_SYNC_RETRY_DELAY_MS";
pub const ENV_AUTH_TIMEOUT_SECS: &str = "INBOX_AUTH_TIMEOUT_SECS";
pub const ENV_AUTH_POLL_INTERVAL_MS: &str = "INBOX_AUTH_POLL_INTERVAL_MS";
pub const ENV_AUTH_CLOSE_DEBOUNCE_MS: &str = "INBOX_AUTH_CLOSE_DEBOUNCE_MS";

/// Tag every authorization result message must carry in its `source` field.
pub const DEFAULT_SOURCE_TAG: &str = "sender-inbox-oauth";

/// Account sync tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Maximum number of accounts synced at the same time (at least 1)
    pub concurrency: usize,

    /// Retries after the first failed attempt of one account sync
    pub max_retries: u32,

    /// Backoff unit; retry `n` waits `retry_base_delay * n`
    pub retry_base_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl SyncSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Turn a loosely typed concurrency value (UI slider, env var) into a
    /// worker count: floored, at least 1. Non-finite input falls back to the
    /// default.
    pub fn normalize_concurrency(raw: f64) -> usize {
        if !raw.is_finite() {
            return Self::default().concurrency;
        }
        let floored = raw.floor();
        if floored < 1.0 {
            1
        } else if floored >= usize::MAX as f64 {
            usize::MAX
        } else {
            floored as usize
        }
    }

    /// Load settings, overriding defaults from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings, overriding defaults from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup(ENV_SYNC_CONCURRENCY) {
            let value: f64 = parse_var(ENV_SYNC_CONCURRENCY, &raw)?;
            settings.concurrency = Self::normalize_concurrency(value);
        }
        if let Some(raw) = lookup(ENV_SYNC_MAX_RETRIES) {
            settings.max_retries = parse_var(ENV_SYNC_MAX_RETRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SYNC_RETRY_DELAY_MS) {
            settings.retry_base_delay =
                Duration::from_millis(parse_var(ENV_SYNC_RETRY_DELAY_MS, &raw)?);
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config(
                "Sync concurrency must be at least 1".to_string(),
            ));
        }

        if self.max_retries > 10 {
            return Err(Error::Config(format!(
                "Sync max_retries of {} exceeds the maximum of 10",
                self.max_retries
            )));
        }

        Ok(())
    }
}

/// Authorization handshake tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeSettings {
    /// How long to wait for the result message before giving up
    pub timeout: Duration,

    /// How often to check whether the user closed the surface
    pub close_poll_interval: Duration,

    /// Grace period after closure is seen, for a result message already in flight
    pub close_debounce: Duration,

    /// Required `source` field of result messages
    pub source_tag: String,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            close_poll_interval: Duration::from_millis(500),
            close_debounce: Duration::from_millis(500),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
        }
    }
}

impl HandshakeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_close_poll_interval(mut self, interval: Duration) -> Self {
        self.close_poll_interval = interval;
        self
    }

    pub fn with_close_debounce(mut self, debounce: Duration) -> Self {
        self.close_debounce = debounce;
        self
    }

    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup(ENV_AUTH_TIMEOUT_SECS) {
            settings.timeout = Duration::from_secs(parse_var(ENV_AUTH_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_AUTH_POLL_INTERVAL_MS) {
            settings.close_poll_interval =
                Duration::from_millis(parse_var(ENV_AUTH_POLL_INTERVAL_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_AUTH_CLOSE_DEBOUNCE_MS) {
            settings.close_debounce =
                Duration::from_millis(parse_var(ENV_AUTH_CLOSE_DEBOUNCE_MS, &raw)?);
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config(
                "Handshake timeout must be greater than zero".to_string(),
            ));
        }

        // tokio intervals panic on a zero period
        if self.close_poll_interval.is_zero() {
            return Err(Error::Config(
                "Handshake close poll interval must be greater than zero".to_string(),
            ));
        }

        if self.source_tag.trim().is_empty() {
            return Err(Error::Config(
                "Handshake source tag cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| Error::Config(format!("Invalid value {:?} for {}: {}", raw, key, e)))
}

/// Core configuration for the inbox core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Remote account/message API (required)
    pub account_service: Arc<dyn AccountService>,

    /// Authorization window launcher (optional)
    pub surface_launcher: Option<Arc<dyn SurfaceLauncher>>,

    /// Inbound message channel for authorization results (optional)
    pub message_channel: Option<Arc<dyn MessageChannel>>,

    pub sync: SyncSettings,

    pub handshake: HandshakeSettings,

    /// Capacity of the core event bus
    pub event_buffer: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("account_service", &"AccountService { ... }")
            .field(
                "surface_launcher",
                &self.surface_launcher.as_ref().map(|_| "SurfaceLauncher { ... }"),
            )
            .field(
                "message_channel",
                &self.message_channel.as_ref().map(|_| "MessageChannel { ... }"),
            )
            .field("sync", &self.sync)
            .field("handshake", &self.handshake)
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Whether the bridges needed to bind new accounts are present.
    pub fn supports_binding(&self) -> bool {
        self.surface_launcher.is_some() && self.message_channel.is_some()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        self.handshake.validate()?;

        if self.event_buffer == 0 {
            return Err(Error::Config(
                "Event buffer capacity must be greater than 0".to_string(),
            ));
        }

        if self.message_channel.is_some() && self.surface_launcher.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "SurfaceLauncher".to_string(),
                message: "A MessageChannel was provided but no SurfaceLauncher. \
                         Desktop: enable the 'desktop-shims' feature for the system browser launcher. \
                         Web: inject a popup-based launcher."
                    .to_string(),
            });
        }

        if self.surface_launcher.is_some() && self.message_channel.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "MessageChannel".to_string(),
                message: "A SurfaceLauncher is configured but no MessageChannel delivers \
                         authorization results. Inject the channel the redirect page posts to."
                    .to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_surface_launcher(
    channel: Option<&Arc<dyn MessageChannel>>,
) -> Option<Arc<dyn SurfaceLauncher>> {
    // Only useful when something can carry the result back.
    channel.map(|_| {
        let launcher: Arc<dyn SurfaceLauncher> =
            Arc::new(bridge_desktop::BrowserSurfaceLauncher::new());
        launcher
    })
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_surface_launcher(
    _channel: Option<&Arc<dyn MessageChannel>>,
) -> Option<Arc<dyn SurfaceLauncher>> {
    None
}

/// Builder for [`CoreConfig`]
#[derive(Default)]
pub struct CoreConfigBuilder {
    account_service: Option<Arc<dyn AccountService>>,
    surface_launcher: Option<Arc<dyn SurfaceLauncher>>,
    message_channel: Option<Arc<dyn MessageChannel>>,
    sync: Option<SyncSettings>,
    handshake: Option<HandshakeSettings>,
    event_buffer: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the account service implementation (required).
    pub fn account_service(mut self, service: Arc<dyn AccountService>) -> Self {
        self.account_service = Some(service);
        self
    }

    pub fn surface_launcher(mut self, launcher: Arc<dyn SurfaceLauncher>) -> Self {
        self.surface_launcher = Some(launcher);
        self
    }

    pub fn message_channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.message_channel = Some(channel);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    pub fn handshake_settings(mut self, settings: HandshakeSettings) -> Self {
        self.handshake = Some(settings);
        self
    }

    /// Shorthand for overriding only the sync concurrency.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        let settings = self.sync.take().unwrap_or_default();
        self.sync = Some(settings.with_concurrency(concurrency));
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` when no `AccountService` was provided, or only
    ///   one of launcher/channel is available
    /// - `Config` when a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let account_service = self.account_service.ok_or_else(|| Error::CapabilityMissing {
            capability: "AccountService".to_string(),
            message: "AccountService implementation is required to list and sync accounts. \
                     Inject the host's API client with .account_service()."
                .to_string(),
        })?;

        let surface_launcher = match self.surface_launcher {
            Some(launcher) => Some(launcher),
            None => provide_default_surface_launcher(self.message_channel.as_ref()),
        };

        let config = CoreConfig {
            account_service,
            surface_launcher,
            message_channel: self.message_channel,
            sync: self.sync.unwrap_or_default(),
            handshake: self.handshake.unwrap_or_default(),
            event_buffer: self.event_buffer.unwrap_or(256),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        Account, AccountId, AuthSurface, AuthorizationStart, MessageSubscription, NewAccount,
        ProviderKind, SyncReport,
    };
    use std::collections::HashMap;

    struct NullAccounts;

    #[async_trait]
    impl AccountService for NullAccounts {
        async fn list_accounts(&self) -> BridgeResult<Vec<Account>> {
            Ok(Vec::new())
        }

        async fn create_account(&self, account: NewAccount) -> BridgeResult<Account> {
            Ok(Account {
                id: AccountId(1),
                provider: account.provider,
                identifier: account.identifier,
                display_name: account.display_name,
                demo: account.demo,
            })
        }

        async fn sync_account(&self, _id: AccountId) -> BridgeResult<SyncReport> {
            Ok(SyncReport::default())
        }

        async fn start_authorization(
            &self,
            _provider: ProviderKind,
        ) -> BridgeResult<AuthorizationStart> {
            Ok(AuthorizationStart {
                auth_url: "https://auth.example/authorize".to_string(),
            })
        }
    }

    struct NullChannel;

    impl MessageChannel for NullChannel {
        fn subscribe(&self) -> MessageSubscription {
            let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
            MessageSubscription::new(rx, || {})
        }
    }

    struct NullLauncher;

    impl SurfaceLauncher for NullLauncher {
        fn open(&self) -> BridgeResult<Box<dyn AuthSurface>> {
            Err(bridge_traits::BridgeError::NotAvailable("popup blocked".into()))
        }
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_sync_settings_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.concurrency, 3);
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.retry_base_delay, Duration::from_millis(500));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_normalize_concurrency() {
        assert_eq!(SyncSettings::normalize_concurrency(4.9), 4);
        assert_eq!(SyncSettings::normalize_concurrency(0.5), 1);
        assert_eq!(SyncSettings::normalize_concurrency(-3.0), 1);
        assert_eq!(SyncSettings::normalize_concurrency(f64::NAN), 3);
        assert_eq!(SyncSettings::normalize_concurrency(f64::INFINITY), 3);
    }

    #[test]
    fn test_with_concurrency_clamps_to_one() {
        assert_eq!(SyncSettings::new().with_concurrency(0).concurrency, 1);
    }

    #[test]
    fn test_sync_settings_from_lookup() {
        let settings = SyncSettings::from_lookup(lookup(&[
            (ENV_SYNC_CONCURRENCY, "2.7"),
            (ENV_SYNC_MAX_RETRIES, "4"),
            (ENV_SYNC_RETRY_DELAY_MS, "25"),
        ]))
        .unwrap();

        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.max_retries, 4);
        assert_eq!(settings.retry_base_delay, Duration::from_millis(25));
    }

    #[test]
    fn test_sync_settings_rejects_garbage() {
        let err = SyncSettings::from_lookup(lookup(&[(ENV_SYNC_MAX_RETRIES, "many")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains(ENV_SYNC_MAX_RETRIES)));
    }

    #[test]
    fn test_sync_settings_rejects_excessive_retries() {
        let settings = SyncSettings::new().with_max_retries(50);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_handshake_settings_from_lookup() {
        let settings = HandshakeSettings::from_lookup(lookup(&[
            (ENV_AUTH_TIMEOUT_SECS, "30"),
            (ENV_AUTH_POLL_INTERVAL_MS, "250"),
            (ENV_AUTH_CLOSE_DEBOUNCE_MS, "1000"),
        ]))
        .unwrap();

        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.close_poll_interval, Duration::from_millis(250));
        assert_eq!(settings.close_debounce, Duration::from_millis(1000));
        assert_eq!(settings.source_tag, DEFAULT_SOURCE_TAG);
    }

    #[test]
    fn test_handshake_settings_validation() {
        assert!(HandshakeSettings::new()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(HandshakeSettings::new()
            .with_close_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(HandshakeSettings::new()
            .with_source_tag(" ")
            .validate()
            .is_err());
    }

    #[test]
    fn test_builder_requires_account_service() {
        let err = CoreConfig::builder().build().unwrap_err();
        assert!(matches!(
            err,
            Error::CapabilityMissing { capability, .. } if capability == "AccountService"
        ));
    }

    #[test]
    fn test_builder_minimal_config() {
        let config = CoreConfig::builder()
            .account_service(Arc::new(NullAccounts))
            .concurrency(5)
            .build()
            .unwrap();

        assert_eq!(config.sync.concurrency, 5);
        assert_eq!(config.event_buffer, 256);
        assert!(!config.supports_binding());
    }

    #[test]
    fn test_builder_with_binding_bridges() {
        let config = CoreConfig::builder()
            .account_service(Arc::new(NullAccounts))
            .surface_launcher(Arc::new(NullLauncher))
            .message_channel(Arc::new(NullChannel))
            .build()
            .unwrap();

        assert!(config.supports_binding());
    }

    #[test]
    fn test_builder_rejects_launcher_without_channel() {
        let err = CoreConfig::builder()
            .account_service(Arc::new(NullAccounts))
            .surface_launcher(Arc::new(NullLauncher))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            Error::CapabilityMissing { capability, .. } if capability == "MessageChannel"
        ));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_rejects_channel_without_launcher() {
        let err = CoreConfig::builder()
            .account_service(Arc::new(NullAccounts))
            .message_channel(Arc::new(NullChannel))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            Error::CapabilityMissing { capability, .. } if capability == "SurfaceLauncher"
        ));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_builder_injects_browser_launcher() {
        let config = CoreConfig::builder()
            .account_service(Arc::new(NullAccounts))
            .message_channel(Arc::new(NullChannel))
            .build()
            .unwrap();

        assert!(config.supports_binding());
    }
}
