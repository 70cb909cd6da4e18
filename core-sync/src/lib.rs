//! # Sync Module
//!
//! Synchronizes mail accounts in bounded, observable batches.
//!
//! ## Overview
//!
//! Each run syncs a list of accounts through the host's `AccountService`:
//! - One job per account, at most `concurrency` in flight
//! - Failing jobs retry with linear backoff before being marked failed
//! - Progress snapshots after every transition, for UI or logs
//! - A summary that counts new messages and names failed accounts
//!
//! ## Components
//!
//! - **Jobs** (`job`): Job identity, labels and outcomes
//! - **Retry Policy** (`retry`): Bounded attempts with linear backoff
//! - **Progress Aggregator** (`progress`): Batch state and snapshots
//! - **Worker Pool** (`pool`): Bounded dispatch over a shared claim counter
//! - **Sync Orchestrator** (`coordinator`): Batches, demo account and account binding

pub mod coordinator;
pub mod error;
pub mod job;
pub mod pool;
pub mod progress;
pub mod retry;

pub use coordinator::{BatchSummary, BindOutcome, SyncOrchestrator};
pub use error::{Result, SyncError};
pub use job::{BatchId, JobOutcome, SyncJob, SyncJobId};
pub use pool::{PoolOutcome, WorkerPool};
pub use progress::{ProgressAggregator, ProgressObserver, ProgressSnapshot, SyncBatch};
pub use retry::RetryPolicy;
