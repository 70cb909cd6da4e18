//! # Progress Aggregation
//!
//! Folds job lifecycle transitions into one [`SyncBatch`] per run and hands
//! out immutable [`ProgressSnapshot`]s after every transition.
//!
//! The aggregator is shared by reference between the workers of a single
//! run. All workers are polled on one task, so state lives in a `RefCell`
//! and every mutation completes before the next suspension point.

use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::redact_if_sensitive;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::job::{BatchId, JobOutcome, SyncJob, SyncJobId};

/// Callback invoked with every snapshot
pub type ProgressObserver<'a> = Box<dyn FnMut(&ProgressSnapshot) + 'a>;

/// Mutable state of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatch {
    pub total: usize,
    pub completed: usize,
    /// Jobs in flight and the label currently shown for them
    pub running: BTreeMap<SyncJobId, String>,
    /// Labels of jobs that failed terminally, first failure first
    pub failed_labels: Vec<String>,
    pub inserted_total: u64,
    finished: BTreeSet<SyncJobId>,
}

impl SyncBatch {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).min(100.0) as u8
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

/// Point-in-time copy of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub batch_id: BatchId,
    pub total: usize,
    pub completed: usize,
    pub running: Vec<String>,
    pub failed_labels: Vec<String>,
    pub inserted_total: u64,
    pub percent: u8,
}

impl ProgressSnapshot {
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

pub struct ProgressAggregator<'a> {
    batch_id: BatchId,
    max_retries: u32,
    batch: RefCell<SyncBatch>,
    observer: RefCell<Option<ProgressObserver<'a>>>,
    event_bus: Option<EventBus>,
}

impl<'a> ProgressAggregator<'a> {
    pub fn new(batch_id: BatchId, total: usize, max_retries: u32) -> Self {
        Self {
            batch_id,
            max_retries,
            batch: RefCell::new(SyncBatch::new(total)),
            observer: RefCell::new(None),
            event_bus: None,
        }
    }

    pub fn with_observer(mut self, observer: ProgressObserver<'a>) -> Self {
        self.observer = RefCell::new(Some(observer));
        self
    }

    /// Publish `SyncEvent::Progress` and `SyncEvent::JobRetrying` on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn on_job_started(&self, job: &SyncJob) {
        {
            let mut batch = self.batch.borrow_mut();
            if batch.finished.contains(&job.id) {
                warn!(job = %job.id, "Ignoring start of a finished job");
                return;
            }
            batch.running.insert(job.id, job.label.clone());
        }
        debug!(
            batch_id = %self.batch_id,
            job = %job.id,
            label = %redact_if_sensitive("label", &job.label),
            "Job started"
        );
        self.publish();
    }

    /// Record that `job` failed attempt `retry` and will run again.
    pub fn on_job_retrying(&self, job: &SyncJob, retry: u32, message: &str) {
        {
            let mut batch = self.batch.borrow_mut();
            if !batch.running.contains_key(&job.id) {
                warn!(job = %job.id, "Ignoring retry of a job that is not running");
                return;
            }
            batch.running.insert(
                job.id,
                format!("{} (retrying {}/{})", job.label, retry, self.max_retries),
            );
        }

        self.emit(SyncEvent::JobRetrying {
            batch_id: self.batch_id.to_string(),
            account_id: job.account_id.value(),
            label: job.label.clone(),
            attempt: retry,
            max_retries: self.max_retries,
            message: message.to_string(),
        });
        self.publish();
    }

    pub fn on_job_finished(&self, job: &SyncJob, outcome: &JobOutcome) {
        {
            let mut batch = self.batch.borrow_mut();
            if !batch.finished.insert(job.id) {
                warn!(job = %job.id, "Ignoring duplicate completion");
                return;
            }
            if batch.running.remove(&job.id).is_none() {
                warn!(job = %job.id, "Job finished without being started");
            }
            batch.completed += 1;

            match outcome {
                JobOutcome::Succeeded { inserted } => batch.inserted_total += inserted,
                JobOutcome::Failed { .. } => batch.failed_labels.push(job.label.clone()),
            }
        }
        debug!(
            batch_id = %self.batch_id,
            job = %job.id,
            success = outcome.is_success(),
            "Job finished"
        );
        self.publish();
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let batch = self.batch.borrow();
        ProgressSnapshot {
            batch_id: self.batch_id,
            total: batch.total,
            completed: batch.completed,
            running: batch.running.values().cloned().collect(),
            failed_labels: batch.failed_labels.clone(),
            inserted_total: batch.inserted_total,
            percent: batch.percent(),
        }
    }

    pub fn into_batch(self) -> SyncBatch {
        self.batch.into_inner()
    }

    fn publish(&self) {
        let snapshot = self.snapshot();

        if let Some(observer) = self.observer.borrow_mut().as_mut() {
            observer(&snapshot);
        }

        self.emit(SyncEvent::Progress {
            batch_id: snapshot.batch_id.to_string(),
            completed: snapshot.completed,
            total: snapshot.total,
            running: snapshot.running,
            inserted_total: snapshot.inserted_total,
            percent: snapshot.percent,
        });
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }
}
