//! Timeout and bounded retry around any [`JobClient`].

use std::future::Future;
use std::time::Duration;

use super::error::JobClientError;
use super::traits::JobClient;
use crate::config::defaults::{
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_BASE_DELAY_MS,
};
use crate::job::{JobArtifact, JobId, JobRequest, StatusSnapshot, SubmitReceipt};

/// Upper bound on a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retry behaviour for job client calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; only transient errors are retried.
    pub max_retries: u32,

    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,

    /// Cap applied to every retry delay.
    pub max_delay: Duration,

    /// Deadline for a single attempt.
    pub request_timeout: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base × 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(20));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// A policy that never retries.
    pub fn no_retries(request_timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            request_timeout,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: MAX_RETRY_DELAY,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Decorator applying a [`RetryPolicy`] to every call of the inner client.
///
/// Each attempt runs under `request_timeout`; an elapsed deadline counts as a
/// transient error. Non-retryable errors are returned on first occurrence.
/// Dropping the returned future cancels the in-flight attempt and any
/// pending backoff sleep.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: JobClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut attempt_fn: F) -> Result<T, JobClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, JobClientError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.policy.request_timeout, attempt_fn()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(JobClientError::Transient(format!(
                    "{operation} timed out after {}ms",
                    self.policy.request_timeout.as_millis()
                ))),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job client call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::debug!(operation, attempts = attempt + 1, error = %e, "Job client call failed");
                    return Err(e);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

impl<C: JobClient> JobClient for RetryingClient<C> {
    async fn submit(&self, request: &JobRequest) -> Result<SubmitReceipt, JobClientError> {
        self.call("submit", || self.inner.submit(request)).await
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot, JobClientError> {
        self.call("fetch_status", || self.inner.fetch_status(job_id)).await
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<JobArtifact, JobClientError> {
        self.call("fetch_result", || self.inner.fetch_result(job_id)).await
    }
}
