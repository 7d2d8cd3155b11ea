//! HTTP implementation of [`JobClient`] against the workflow backend.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | call | request |
//! |------|---------|
//! | submit | `POST {base}/workflows` |
//! | status | `GET {base}/workflows/{id}/status` |
//! | result | `GET {base}/workflows/{id}/result` |
//! | events | `GET {base}/workflows/{id}/events` (push channel) |
//!
//! Non-success statuses are classified by [`JobClientError::from_status`].
//! A success response whose body cannot be decoded is reported as
//! [`JobClientError::Transient`].

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::JobClientError;
use super::traits::JobClient;
use crate::job::{
    JobArtifact, JobId, JobRequest, LifecycleState, StatusSnapshot, SubmitReceipt,
};

/// URL builder for the workflow endpoints.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub(crate) fn new(base_url: &str) -> Result<Self, JobClientError> {
        let base = Url::parse(base_url)
            .map_err(|e| JobClientError::Validation(format!("Invalid backend URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(JobClientError::Validation(format!(
                "Invalid backend URL '{base_url}': not a base URL"
            )));
        }
        Ok(Self { base })
    }

    fn build(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `cannot_be_a_base` was rejected in `new`, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    pub(crate) fn submit(&self) -> Url {
        self.build(&["workflows"])
    }

    pub(crate) fn status(&self, job_id: &JobId) -> Url {
        self.build(&["workflows", job_id.as_str(), "status"])
    }

    pub(crate) fn result(&self, job_id: &JobId) -> Url {
        self.build(&["workflows", job_id.as_str(), "result"])
    }

    pub(crate) fn events(&self, job_id: &JobId) -> Url {
        self.build(&["workflows", job_id.as_str(), "events"])
    }
}

/// Body returned by the submit endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default, alias = "job_id", alias = "id")]
    job_id: JobId,

    #[serde(default, alias = "lifecycleState", alias = "state")]
    status: Option<LifecycleState>,
}

/// Job client speaking JSON over HTTP.
///
/// Per-call timeouts and retries are applied by wrapping this client in a
/// [`RetryingClient`](super::RetryingClient).
pub struct HttpJobClient {
    /// Reusable HTTP client with connection pooling.
    http: reqwest::Client,

    endpoints: Endpoints,
}

impl HttpJobClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, JobClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| JobClientError::Validation(format!("Failed to build HTTP client: {e}")))?;
        Self::with_client(base_url, http)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self, JobClientError> {
        Ok(Self {
            http,
            endpoints: Endpoints::new(base_url)?,
        })
    }
}

impl JobClient for HttpJobClient {
    async fn submit(&self, request: &JobRequest) -> Result<SubmitReceipt, JobClientError> {
        let response = self
            .http
            .post(self.endpoints.submit())
            .json(request)
            .send()
            .await?;

        let body: SubmitResponse = read_json(response, None).await?;
        if body.job_id.is_empty() {
            return Err(JobClientError::Transient(
                "Submit response did not include a job id".to_string(),
            ));
        }

        let receipt = SubmitReceipt {
            job_id: body.job_id,
            initial_state: body.status.unwrap_or(LifecycleState::Queued),
        };
        tracing::debug!(
            job_id = %receipt.job_id,
            initial_state = %receipt.initial_state,
            "Job submitted"
        );
        Ok(receipt)
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot, JobClientError> {
        let response = self.http.get(self.endpoints.status(job_id)).send().await?;

        let mut snapshot: StatusSnapshot = read_json(response, Some(job_id)).await?;
        if snapshot.job_id.is_empty() {
            snapshot.job_id = job_id.clone();
        }

        tracing::trace!(
            job_id = %job_id,
            state = %snapshot.lifecycle_state,
            progress = snapshot.progress,
            "Status fetched"
        );
        Ok(snapshot)
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<JobArtifact, JobClientError> {
        let response = self.http.get(self.endpoints.result(job_id)).send().await?;

        let content: serde_json::Value = read_json(response, Some(job_id)).await?;
        Ok(JobArtifact {
            job_id: job_id.clone(),
            content,
        })
    }
}

/// Classify the status and decode a JSON body.
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    job_id: Option<&JobId>,
) -> Result<T, JobClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(JobClientError::from_status(status.as_u16(), job_id, &body));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| JobClientError::Transient(format!("Malformed response body: {e}")))
}
