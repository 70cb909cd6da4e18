//! # Retry Policy
//!
//! Bounded retries with linear backoff: a job gets `1 + max_retries`
//! attempts and waits `base_delay * n` before retry `n`.

use core_runtime::config::SyncSettings;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::job::SyncJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_base_delay)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Run `operation` for `job` until it succeeds or attempts run out.
    ///
    /// `job.attempts` tracks the attempt in progress. `on_retry` is called
    /// with the retry number and the error before each backoff wait.
    pub async fn run<T, E, Op, Fut, OnRetry>(
        &self,
        job: &mut SyncJob,
        mut operation: Op,
        mut on_retry: OnRetry,
    ) -> Result<T>
    where
        E: Display,
        Op: FnMut(&SyncJob) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        OnRetry: FnMut(&SyncJob, u32, &E),
    {
        let max_attempts = self.max_attempts();

        loop {
            job.attempts += 1;
            let attempt = job.attempts;

            match operation(&*job).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(job = %job.id, attempt, "Sync succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        job = %job.id,
                        account_id = %job.account_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Account sync failed, retrying"
                    );
                    on_retry(&*job, attempt, &e);
                    sleep(delay).await;
                }
                Err(e) => {
                    return Err(SyncError::RetriesExhausted {
                        label: job.label.clone(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SyncJobId;
    use bridge_traits::AccountId;
    use std::cell::{Cell, RefCell};
    use tokio::time::Instant;

    fn job() -> SyncJob {
        SyncJob::new(SyncJobId(0), AccountId(1), "ada@example.com")
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(2, Duration::from_millis(500));
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_default_policy_matches_settings() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let mut job = job();
        let calls = Cell::new(0u32);
        let retries = RefCell::new(Vec::new());
        let started = Instant::now();

        let value = policy
            .run(
                &mut job,
                |_| {
                    calls.set(calls.get() + 1);
                    let call = calls.get();
                    async move {
                        if call < 3 {
                            Err(format!("attempt {} failed", call))
                        } else {
                            Ok(call * 10)
                        }
                    }
                },
                |_, retry, error: &String| retries.borrow_mut().push((retry, error.clone())),
            )
            .await
            .unwrap();

        assert_eq!(value, 30);
        assert_eq!(job.attempts, 3);
        assert_eq!(
            retries.into_inner(),
            vec![
                (1, "attempt 1 failed".to_string()),
                (2, "attempt 2 failed".to_string())
            ]
        );
        // 100ms before retry 1, 200ms before retry 2
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let mut job = job();
        let retries = Cell::new(0);

        let err = policy
            .run(
                &mut job,
                |job| {
                    let attempt = job.attempts;
                    async move { Err::<(), _>(format!("boom {}", attempt)) }
                },
                |_, _, _| retries.set(retries.get() + 1),
            )
            .await
            .unwrap_err();

        match err {
            SyncError::RetriesExhausted {
                label,
                attempts,
                last_error,
            } => {
                assert_eq!(label, "ada@example.com");
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "boom 3");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(retries.get(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(60));
        let mut job = job();

        let result = policy
            .run(
                &mut job,
                |_| async { Err::<(), _>("nope") },
                |_, _, _| panic!("no retry expected"),
            )
            .await;

        assert!(matches!(result, Err(SyncError::RetriesExhausted { attempts: 1, .. })));
    }
}
