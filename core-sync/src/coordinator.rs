//! # Sync Orchestrator
//!
//! Runs account sync batches and binds new accounts.
//!
//! ## Overview
//!
//! The `SyncOrchestrator` turns a list of accounts into one batch:
//! - Creates the demo account when there is nothing to sync
//! - Dispatches one job per account through a bounded `WorkerPool`
//! - Retries failing jobs with linear backoff via `RetryPolicy`
//! - Reports progress snapshots to an observer and as `SyncEvent`s
//! - Summarizes the run without failing on per-account errors
//!
//! ## Workflow
//!
//! ### Batch
//! 1. Create the demo account if `accounts` is empty
//! 2. Build one `SyncJob` per account, in input order
//! 3. Run `min(concurrency, jobs)` workers until every job has finished
//! 4. Emit completion and return a `BatchSummary`
//!
//! ### Bind
//! 1. Run an authorization handshake for the provider
//! 2. Close the surface and turn the result into a single job
//! 3. Run that job as a one-job batch
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncOrchestrator;
//!
//! # async fn example(orchestrator: SyncOrchestrator) -> core_sync::Result<()> {
//! let summary = orchestrator
//!     .run_batch_observed(Vec::new(), 3, |snapshot| {
//!         println!("{}% ({:?})", snapshot.percent, snapshot.running);
//!     })
//!     .await?;
//! println!("{}", summary.message);
//! # Ok(())
//! # }
//! ```

use bridge_traits::{Account, AccountId, AccountService, NewAccount, ProviderKind};
use core_auth::{AuthorizationResult, HandshakeChannel};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::redact_if_sensitive;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, info_span, instrument, warn, Instrument};

use crate::job::{BatchId, SyncJob, SyncJobId};
use crate::pool::WorkerPool;
use crate::progress::{ProgressAggregator, ProgressObserver, ProgressSnapshot};
use crate::retry::RetryPolicy;
use crate::{Result, SyncError};

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub total: usize,
    pub completed: usize,
    pub inserted_total: u64,
    /// Labels of accounts that failed, first failure first
    pub failed_labels: Vec<String>,
    pub succeeded: Vec<AccountId>,
    pub failed: Vec<AccountId>,
    pub duration: Duration,
    /// Human-facing one-liner
    pub message: String,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_labels.is_empty()
    }
}

/// Result of binding a new account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    pub provider: ProviderKind,
    pub account_id: AccountId,
    pub authorization: AuthorizationResult,
    pub summary: BatchSummary,
}

pub struct SyncOrchestrator {
    accounts: Arc<dyn AccountService>,
    settings: SyncSettings,
    event_bus: EventBus,
    handshake: Option<HandshakeChannel>,
}

impl SyncOrchestrator {
    pub fn new(
        accounts: Arc<dyn AccountService>,
        settings: SyncSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            accounts,
            settings,
            event_bus,
            handshake: None,
        }
    }

    /// Enable [`bind_account`](Self::bind_account).
    pub fn with_handshake(mut self, handshake: HandshakeChannel) -> Self {
        self.handshake = Some(handshake);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Sync every account the service knows about at the configured concurrency.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<BatchSummary> {
        let accounts = self
            .accounts
            .list_accounts()
            .await
            .map_err(|e| SyncError::AccountListing(e.to_string()))?;

        self.run_batch(accounts, self.settings.concurrency).await
    }

    pub async fn run_batch(
        &self,
        accounts: Vec<Account>,
        concurrency: usize,
    ) -> Result<BatchSummary> {
        self.run_batch_observed(accounts, concurrency, |_| {}).await
    }

    /// Run one batch, calling `observer` after every progress transition.
    ///
    /// Per-account failures end up in the summary. Only a failure to create
    /// the demo account for an empty batch is returned as an error.
    #[instrument(skip(self, accounts, observer), fields(accounts = accounts.len()))]
    pub async fn run_batch_observed<F>(
        &self,
        accounts: Vec<Account>,
        concurrency: usize,
        observer: F,
    ) -> Result<BatchSummary>
    where
        F: FnMut(&ProgressSnapshot),
    {
        let jobs = if accounts.is_empty() {
            let demo = self.create_demo_account().await?;
            vec![SyncJob::for_account(SyncJobId(0), &demo)]
        } else {
            SyncJob::for_accounts(&accounts)
        };

        self.run_jobs(jobs, concurrency, Box::new(observer)).await
    }

    /// Bind a new account for `provider` and sync it.
    ///
    /// The authorization surface opens before this returns, so call it
    /// directly from the user action that requested the binding.
    pub fn bind_account(
        &self,
        provider: ProviderKind,
    ) -> impl Future<Output = Result<BindOutcome>> + '_ {
        let pending = self.handshake.as_ref().map(|handshake| handshake.begin(provider));

        async move {
            let pending = pending.ok_or(SyncError::BindingUnavailable)?;
            let authorized = pending.await?;
            let (account_id, identifier) = authorized.account()?;
            let authorization = authorized.result.clone();
            // Done with the consent screen
            drop(authorized);

            let label = match identifier {
                Some(identifier) => identifier,
                None => self.label_for(provider, account_id).await,
            };
            info!(
                %account_id,
                label = %redact_if_sensitive("label", &label),
                "Account bound, running first sync"
            );

            let job = SyncJob::new(SyncJobId(0), account_id, label);
            let summary = self.run_jobs(vec![job], 1, Box::new(|_: &ProgressSnapshot| {})).await?;

            Ok(BindOutcome {
                provider,
                account_id,
                authorization,
                summary,
            })
        }
        .instrument(info_span!("bind_account", %provider))
    }

    async fn run_jobs(
        &self,
        jobs: Vec<SyncJob>,
        concurrency: usize,
        observer: ProgressObserver<'_>,
    ) -> Result<BatchSummary> {
        let batch_id = BatchId::new();
        let started_at = Instant::now();
        let total = jobs.len();
        let retry = RetryPolicy::from_settings(&self.settings);
        let pool = WorkerPool::new(concurrency, retry);
        let workers = pool.worker_count(total);

        info!(%batch_id, total, workers, "Starting sync batch");
        self.emit(SyncEvent::Started {
            batch_id: batch_id.to_string(),
            total,
            concurrency: workers,
        });

        let progress = ProgressAggregator::new(batch_id, total, retry.max_retries())
            .with_observer(observer)
            .with_event_bus(self.event_bus.clone());

        let accounts = &self.accounts;
        let outcome = pool
            .run(jobs, &progress, |account_id| async move {
                accounts
                    .sync_account(account_id)
                    .await
                    .map(|report| report.inserted)
                    .map_err(|e| SyncError::Attempt(e.to_string()))
            })
            .await;

        let snapshot = progress.snapshot();
        let duration = started_at.elapsed();
        let summary = BatchSummary {
            batch_id,
            total,
            completed: snapshot.completed,
            inserted_total: outcome.inserted_total,
            message: summary_message(outcome.inserted_total, total, &outcome.failed_labels),
            succeeded: outcome.succeeded.iter().map(|job| job.account_id).collect(),
            failed: outcome.failed.iter().map(|job| job.account_id).collect(),
            failed_labels: outcome.failed_labels,
            duration,
        };

        if summary.is_clean() {
            info!(
                %batch_id,
                inserted = summary.inserted_total,
                duration_ms = duration.as_millis() as u64,
                "Sync batch completed"
            );
        } else {
            warn!(
                %batch_id,
                inserted = summary.inserted_total,
                failed = ?loggable_labels(&summary.failed_labels),
                "Sync batch completed with failures"
            );
        }

        self.emit(SyncEvent::Completed {
            batch_id: batch_id.to_string(),
            inserted_total: summary.inserted_total,
            failed: summary.failed_labels.clone(),
            duration_ms: duration.as_millis() as u64,
        });

        Ok(summary)
    }

    async fn create_demo_account(&self) -> Result<Account> {
        info!("No accounts connected, creating demo account");

        self.accounts
            .create_account(NewAccount::demo())
            .await
            .map_err(|e| SyncError::DemoAccountCreation(e.to_string()))
    }

    /// Label for a bound account that came back without an identifier.
    async fn label_for(&self, provider: ProviderKind, account_id: AccountId) -> String {
        match self.accounts.list_accounts().await {
            Ok(accounts) => {
                if let Some(account) = accounts.iter().find(|account| account.id == account_id) {
                    return account.label();
                }
            }
            Err(e) => warn!(error = %e, "Failed to list accounts for label lookup"),
        }
        format!("{} account {}", provider, account_id)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.event_bus.emit(CoreEvent::Sync(event));
    }
}

fn summary_message(inserted: u64, accounts: usize, failed: &[String]) -> String {
    let mut message = format!(
        "Synced {} new {} from {} {}",
        inserted,
        if inserted == 1 { "message" } else { "messages" },
        accounts,
        if accounts == 1 { "account" } else { "accounts" },
    );
    if !failed.is_empty() {
        message.push_str("; failed: ");
        message.push_str(&failed.join(", "));
    }
    message
}

/// Labels are usually mailbox addresses.
fn loggable_labels(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .map(|label| redact_if_sensitive("label", label))
        .collect()
}
