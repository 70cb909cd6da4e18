//! # Sync Jobs
//!
//! One job per account per batch. A job's identity and label are fixed when
//! the batch starts; only its attempt counter changes while it retries.

use bridge_traits::{Account, AccountId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Position of a job within its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncJobId(pub usize);

impl fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Job
// ============================================================================

/// One account sync inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub account_id: AccountId,
    /// Human-facing label shown in progress and failure lists
    pub label: String,
    /// Attempts started so far
    pub attempts: u32,
}

impl SyncJob {
    pub fn new(id: SyncJobId, account_id: AccountId, label: impl Into<String>) -> Self {
        Self {
            id,
            account_id,
            label: label.into(),
            attempts: 0,
        }
    }

    pub fn for_account(id: SyncJobId, account: &Account) -> Self {
        Self::new(id, account.id, account.label())
    }

    /// Jobs for `accounts`, in order.
    pub fn for_accounts(accounts: &[Account]) -> Vec<Self> {
        accounts
            .iter()
            .enumerate()
            .map(|(index, account)| Self::for_account(SyncJobId(index), account))
            .collect()
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded { inserted: u64 },
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}
