//! # Worker Pool
//!
//! Runs a batch of jobs with at most `W` in flight. Workers are futures
//! joined on the current task; they claim jobs from one shared counter, so
//! no job starts twice and none is skipped.

use bridge_traits::AccountId;
use core_runtime::logging::redact_if_sensitive;
use futures::future::join_all;
use std::cell::Cell;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

use crate::job::{JobOutcome, SyncJob};
use crate::progress::ProgressAggregator;
use crate::retry::RetryPolicy;

/// Result of running every job in a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    pub inserted_total: u64,
    pub failed_labels: Vec<String>,
    /// Jobs that succeeded, in batch order
    pub succeeded: Vec<SyncJob>,
    /// Jobs that exhausted their retries, in batch order
    pub failed: Vec<SyncJob>,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
    retry: RetryPolicy,
}

impl WorkerPool {
    pub fn new(concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Workers used for `jobs` jobs.
    pub fn worker_count(&self, jobs: usize) -> usize {
        self.concurrency.min(jobs)
    }

    /// Run every job through `work`, reporting transitions to `progress`.
    pub async fn run<F, Fut, E>(
        &self,
        jobs: Vec<SyncJob>,
        progress: &ProgressAggregator<'_>,
        work: F,
    ) -> PoolOutcome
    where
        F: Fn(AccountId) -> Fut,
        Fut: Future<Output = std::result::Result<u64, E>>,
        E: Display,
    {
        let next = Cell::new(0usize);
        let workers = self.worker_count(jobs.len());
        debug!(jobs = jobs.len(), workers, "Dispatching jobs");

        let results = join_all(
            (0..workers).map(|worker| self.worker(worker, &jobs, &next, progress, &work)),
        )
        .await;

        let mut finished: Vec<(SyncJob, JobOutcome)> = results.into_iter().flatten().collect();
        finished.sort_by_key(|(job, _)| job.id);

        let snapshot = progress.snapshot();
        let mut outcome = PoolOutcome {
            inserted_total: snapshot.inserted_total,
            failed_labels: snapshot.failed_labels,
            ..Default::default()
        };
        for (job, result) in finished {
            if result.is_success() {
                outcome.succeeded.push(job);
            } else {
                outcome.failed.push(job);
            }
        }
        outcome
    }

    async fn worker<F, Fut, E>(
        &self,
        worker: usize,
        jobs: &[SyncJob],
        next: &Cell<usize>,
        progress: &ProgressAggregator<'_>,
        work: &F,
    ) -> Vec<(SyncJob, JobOutcome)>
    where
        F: Fn(AccountId) -> Fut,
        Fut: Future<Output = std::result::Result<u64, E>>,
        E: Display,
    {
        let mut finished = Vec::new();

        loop {
            let index = next.get();
            if index >= jobs.len() {
                break;
            }
            next.set(index + 1);

            let mut job = jobs[index].clone();
            debug!(
                worker,
                job = %job.id,
                label = %redact_if_sensitive("label", &job.label),
                "Claimed job"
            );
            progress.on_job_started(&job);

            let outcome = match self
                .retry
                .run(
                    &mut job,
                    |job| work(job.account_id),
                    |job, retry, error| progress.on_job_retrying(job, retry, &error.to_string()),
                )
                .await
            {
                Ok(inserted) => JobOutcome::Succeeded { inserted },
                Err(e) => {
                    warn!(
                        worker,
                        job = %job.id,
                        label = %redact_if_sensitive("label", &job.label),
                        error = %e,
                        "Job failed"
                    );
                    JobOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            progress.on_job_finished(&job, &outcome);
            finished.push((job, outcome));
        }

        finished
    }
}
