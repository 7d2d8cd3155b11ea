//! Error taxonomy for job client calls.

use thiserror::Error;

use crate::job::JobId;

/// Errors returned by [`JobClient`](super::JobClient) operations.
///
/// Only [`JobClientError::Transient`] is retried; every other variant
/// propagates on first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobClientError {
    /// The backend rejected the request (400/422 and other client errors).
    #[error("Request rejected: {0}")]
    Validation(String),

    /// The job id is unknown to the backend (404/410).
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// Network failure, timeout, 5xx or an unreadable response body.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The result was requested before the job succeeded (409/425).
    #[error("Result for job {0} is not ready")]
    NotReady(JobId),
}

impl JobClientError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a non-success HTTP status.
    ///
    /// `job_id` is `None` for calls that are not keyed by a job (submit); a
    /// 404 there means the endpoint itself is wrong, which is a request error.
    pub fn from_status(status: u16, job_id: Option<&JobId>, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };

        match (status, job_id) {
            (404 | 410, Some(id)) => Self::NotFound(id.clone()),
            (409 | 425, Some(id)) => Self::NotReady(id.clone()),
            (408 | 429, _) => Self::Transient(detail),
            (500..=599, _) => Self::Transient(detail),
            _ => Self::Validation(detail),
        }
    }
}

impl From<reqwest::Error> for JobClientError {
    fn from(e: reqwest::Error) -> Self {
        JobClientError::Transient(e.to_string())
    }
}
