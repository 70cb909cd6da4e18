//! Account Service Abstraction
//!
//! The remote account/message API as seen by the core: listing and creating
//! accounts, running one sync per account, and starting a provider
//! authorization flow. Transport, auth headers and retries at the HTTP level
//! belong to the host implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::Result;

/// Server-assigned account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl AccountId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Mail providers that can be bound through the authorization handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gmail,
    Outlook,
    Yahoo,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gmail => "gmail",
            ProviderKind::Outlook => "outlook",
            ProviderKind::Yahoo => "yahoo",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" | "google" => Ok(ProviderKind::Gmail),
            "outlook" | "microsoft" => Ok(ProviderKind::Outlook),
            "yahoo" => Ok(ProviderKind::Yahoo),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// A connected mail account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    /// Provider name as reported by the server (`gmail`, `demo`, ...)
    pub provider: String,
    /// Mailbox address or other provider-side identifier
    pub identifier: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub demo: bool,
}

impl Account {
    /// Human-facing label used in progress and failure lists.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self.identifier.clone(),
        }
    }
}

/// Parameters for creating an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub provider: String,
    pub identifier: String,
    pub display_name: Option<String>,
    pub demo: bool,
}

impl NewAccount {
    pub const DEMO_PROVIDER: &'static str = "demo";
    pub const DEMO_IDENTIFIER: &'static str = "demo@sender-inbox.local";

    /// The built-in demo account created when a user has nothing connected yet.
    pub fn demo() -> Self {
        Self {
            provider: Self::DEMO_PROVIDER.to_string(),
            identifier: Self::DEMO_IDENTIFIER.to_string(),
            display_name: Some("Demo Inbox".to_string()),
            demo: true,
        }
    }
}

/// Result of one account sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Number of new messages stored by this sync
    pub inserted: u64,
}

/// Where to send the user to authorize a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationStart {
    pub auth_url: String,
}

/// Account service trait
///
/// Every method is a network round-trip and may fail. `sync_account` failures
/// are retried by the caller; `start_authorization` failures are not.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::accounts::{AccountService, NewAccount};
///
/// async fn ensure_account(service: &dyn AccountService) -> Result<()> {
///     if service.list_accounts().await?.is_empty() {
///         service.create_account(NewAccount::demo()).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait AccountService: Send + Sync {
    /// List all accounts connected for the current user
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Create an account and return it with its assigned id
    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    /// Fetch new messages for one account
    async fn sync_account(&self, id: AccountId) -> Result<SyncReport>;

    /// Begin a provider authorization flow
    async fn start_authorization(&self, provider: ProviderKind) -> Result<AuthorizationStart>;
}
