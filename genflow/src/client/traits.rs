//! The job client abstraction.

use std::future::Future;
use std::sync::Arc;

use super::error::JobClientError;
use crate::job::{JobArtifact, JobId, JobRequest, StatusSnapshot, SubmitReceipt};

/// Submit jobs and query their status and result.
///
/// Implementations must be cheap to share: the tracker holds one behind an
/// `Arc` and calls it from spawned tasks.
pub trait JobClient: Send + Sync {
    /// Submit a new job.
    fn submit(
        &self,
        request: &JobRequest,
    ) -> impl Future<Output = Result<SubmitReceipt, JobClientError>> + Send;

    /// Fetch the current status snapshot of a job.
    fn fetch_status(
        &self,
        job_id: &JobId,
    ) -> impl Future<Output = Result<StatusSnapshot, JobClientError>> + Send;

    /// Fetch the final result of a succeeded job.
    fn fetch_result(
        &self,
        job_id: &JobId,
    ) -> impl Future<Output = Result<JobArtifact, JobClientError>> + Send;
}

impl<C: JobClient> JobClient for Arc<C> {
    fn submit(
        &self,
        request: &JobRequest,
    ) -> impl Future<Output = Result<SubmitReceipt, JobClientError>> + Send {
        (**self).submit(request)
    }

    fn fetch_status(
        &self,
        job_id: &JobId,
    ) -> impl Future<Output = Result<StatusSnapshot, JobClientError>> + Send {
        (**self).fetch_status(job_id)
    }

    fn fetch_result(
        &self,
        job_id: &JobId,
    ) -> impl Future<Output = Result<JobArtifact, JobClientError>> + Send {
        (**self).fetch_result(job_id)
    }
}
