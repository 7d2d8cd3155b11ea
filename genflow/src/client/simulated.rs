//! In-process backend for offline runs and tests.
//!
//! Every status fetch advances a job's progress by a fixed step and stamps
//! the snapshot one second after the previous one, so consumers see a
//! deterministic, strictly ordered sequence ending in `succeeded` (or
//! `failed`, when a failure point is configured).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;

use super::error::JobClientError;
use super::traits::JobClient;
use crate::job::{
    JobArtifact, JobId, JobRequest, LifecycleState, PhaseReport, PhaseReportStatus,
    StatusSnapshot, SubmitReceipt,
};
use crate::phase::PhaseTable;

/// Default progress added per status fetch.
pub const DEFAULT_SIMULATED_STEP: i32 = 15;

#[derive(Debug)]
struct SimulatedJob {
    request: JobRequest,
    progress: i32,
    state: LifecycleState,
    created_at: DateTime<Utc>,
    version: i64,
}

/// A [`JobClient`] that runs jobs entirely in memory.
pub struct SimulatedJobClient {
    jobs: Mutex<HashMap<JobId, SimulatedJob>>,
    table: PhaseTable,
    step: i32,
    failure: Option<(i32, String)>,
    next_id: AtomicU64,
    status_calls: AtomicUsize,
    result_calls: AtomicUsize,
}

impl Default for SimulatedJobClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedJobClient {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            table: PhaseTable::content_pipeline(),
            step: DEFAULT_SIMULATED_STEP,
            failure: None,
            next_id: AtomicU64::new(1),
            status_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
        }
    }

    /// Progress added per status fetch (at least 1).
    pub fn with_step(mut self, step: i32) -> Self {
        self.step = step.max(1);
        self
    }

    /// Fail every job once its progress reaches `at_progress`.
    pub fn with_failure(mut self, at_progress: i32, message: impl Into<String>) -> Self {
        self.failure = Some((at_progress, message.into()));
        self
    }

    /// Register a running job under a caller-chosen id.
    pub fn insert_job(&self, job_id: JobId, request: JobRequest) {
        let job = SimulatedJob {
            request,
            progress: 0,
            state: LifecycleState::Queued,
            created_at: Utc::now(),
            version: 0,
        };
        self.lock_jobs().insert(job_id, job);
    }

    /// Number of `fetch_status` calls served.
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_result` calls served.
    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, SimulatedJob>> {
        // A poisoned map only means a panicking test thread; the data is still usable.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance(&self, job: &mut SimulatedJob) {
        if job.state.is_terminal() {
            return;
        }

        job.version += 1;
        job.progress = (job.progress + self.step).min(100);
        job.state = LifecycleState::Running;

        if let Some((at, _)) = &self.failure {
            if job.progress >= *at {
                job.progress = *at;
                job.state = LifecycleState::Failed;
                return;
            }
        }
        if job.progress >= 100 {
            job.state = LifecycleState::Succeeded;
        }
    }

    fn snapshot_of(&self, job_id: &JobId, job: &SimulatedJob) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::new(job_id.clone(), job.state, job.progress);
        snapshot.created_at = Some(job.created_at);
        snapshot.updated_at = Some(job.created_at + ChronoDuration::seconds(job.version));

        if let Some(phase) = self.table.phase_at(job.progress) {
            snapshot.current_phase_label = Some(phase.title.clone());
        }

        for phase in self.table.phases() {
            if job.progress >= i32::from(phase.end) {
                let report = PhaseReport {
                    status: Some(PhaseReportStatus::Done),
                    progress: Some(100),
                    payload: Some(phase_payload(&phase.key, &job.request)),
                    log_message: Some(format!("{} complete", phase.title)),
                };
                snapshot = snapshot.with_phase_report(phase.key.clone(), report);
            }
        }

        if job.state == LifecycleState::Failed {
            if let Some((_, message)) = &self.failure {
                snapshot.error_message = Some(message.clone());
            }
        }
        snapshot
    }
}

impl JobClient for SimulatedJobClient {
    async fn submit(&self, request: &JobRequest) -> Result<SubmitReceipt, JobClientError> {
        if request.topic.trim().is_empty() {
            return Err(JobClientError::Validation("topic must not be empty".to_string()));
        }

        let job_id = JobId::new(format!(
            "sim-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        self.insert_job(job_id.clone(), request.clone());

        tracing::debug!(job_id = %job_id, topic = %request.topic, "Simulated job submitted");
        Ok(SubmitReceipt {
            job_id,
            initial_state: LifecycleState::Queued,
        })
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot, JobClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let mut jobs = self.lock_jobs();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobClientError::NotFound(job_id.clone()))?;
        self.advance(job);
        Ok(self.snapshot_of(job_id, job))
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<JobArtifact, JobClientError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);

        let jobs = self.lock_jobs();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| JobClientError::NotFound(job_id.clone()))?;
        if job.state != LifecycleState::Succeeded {
            return Err(JobClientError::NotReady(job_id.clone()));
        }

        let content = json!({
            "title": job.request.topic,
            "keywords": phase_payload("keyword_research", &job.request),
            "sections": [
                {"heading": "Introduction", "body": format!("An introduction to {}.", job.request.topic)},
                {"heading": "Details", "body": format!("A closer look at {}.", job.request.topic)},
            ],
            "images": [format!("https://images.invalid/{job_id}/cover.png")],
        });
        Ok(JobArtifact {
            job_id: job_id.clone(),
            content,
        })
    }
}

fn phase_payload(key: &str, request: &JobRequest) -> serde_json::Value {
    match key {
        "keyword_research" => {
            let mut keywords = request.keywords.clone();
            keywords.push(request.topic.to_lowercase());
            json!(keywords)
        }
        "content_outline" => json!(["Introduction", "Details"]),
        _ => json!({ "phase": key }),
    }
}
