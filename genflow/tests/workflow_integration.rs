//! Integration tests for the workflow tracker.
//!
//! These tests drive a complete [`WorkflowTracker`] against scripted backends
//! and verify:
//! - The push happy path and the single result fetch
//! - Fallback to polling after repeated push failures
//! - Rejection of out-of-order snapshots, including a stale terminal frame
//! - Job failure surfacing and phase projection
//! - Retry after a failed result fetch
//! - Idempotent reset

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt};
use genflow::client::{JobClient, JobClientError, RetryPolicy};
use genflow::job::{JobArtifact, JobId, JobRequest, LifecycleState, StatusSnapshot, SubmitReceipt};
use genflow::phase::{current_phase, project, PhaseStatus, PhaseTable};
use genflow::push::{ByteStream, PushError, PushTransport, ReconnectPolicy};
use genflow::reconcile::{
    ConnectionState, ErrorOrigin, TrackerConfig, WorkflowHandle, WorkflowState, WorkflowTracker,
};

// =============================================================================
// Test Helpers
// =============================================================================

const JOB: &str = "abc";

/// Job client with a fixed job id and scripted status and result outcomes.
#[derive(Default)]
struct ScriptedClient {
    statuses: Mutex<VecDeque<Result<StatusSnapshot, JobClientError>>>,
    results: Mutex<VecDeque<Result<JobArtifact, JobClientError>>>,
    result_ids: Mutex<Vec<JobId>>,
    submits: AtomicUsize,
    status_calls: AtomicUsize,
}

impl ScriptedClient {
    fn with_statuses(statuses: Vec<Result<StatusSnapshot, JobClientError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }

    fn with_results(self, results: Vec<Result<JobArtifact, JobClientError>>) -> Self {
        *self.results.lock().unwrap() = results.into();
        self
    }

    fn result_ids(&self) -> Vec<JobId> {
        self.result_ids.lock().unwrap().clone()
    }
}

impl JobClient for ScriptedClient {
    async fn submit(&self, _request: &JobRequest) -> Result<SubmitReceipt, JobClientError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitReceipt {
            job_id: JobId::from(JOB),
            initial_state: LifecycleState::Queued,
        })
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot, JobClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatusSnapshot::new(job_id.clone(), LifecycleState::Running, 0)))
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<JobArtifact, JobClientError> {
        self.result_ids.lock().unwrap().push(job_id.clone());
        self.results.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(JobArtifact {
                job_id: job_id.clone(),
                content: serde_json::json!({"title": "Rust async"}),
            })
        })
    }
}

/// One scripted push connection.
enum Connection {
    Refuse,
    /// Deliver the frames and keep the stream open.
    Hold(Vec<String>),
}

#[derive(Default)]
struct ScriptedPush {
    connections: Mutex<VecDeque<Connection>>,
    connects: AtomicUsize,
}

impl ScriptedPush {
    fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections: Mutex::new(connections.into()),
            connects: AtomicUsize::new(0),
        }
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl PushTransport for ScriptedPush {
    async fn connect(&self, _job_id: &JobId, _last_event_id: Option<&str>) -> Result<ByteStream, PushError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.connections.lock().unwrap().pop_front().unwrap_or(Connection::Refuse) {
            Connection::Refuse => Err(PushError::Connect("connection refused".into())),
            Connection::Hold(frames) => {
                let chunks: Vec<_> = frames
                    .into_iter()
                    .map(|frame| Ok::<_, PushError>(Bytes::from(frame)))
                    .collect();
                Ok(stream::iter(chunks).chain(stream::pending()).boxed())
            }
        }
    }
}

fn at(second: u32) -> String {
    format!("2026-05-01T12:00:{second:02}Z")
}

/// A `status_update` frame.
fn frame(state: &str, progress: i32, second: u32) -> String {
    format!(
        "event: status_update\ndata: {{\"jobId\":\"{JOB}\",\"lifecycleState\":\"{state}\",\"progress\":{progress},\"updatedAt\":\"{}\"}}\n\n",
        at(second)
    )
}

fn snapshot(state: LifecycleState, progress: i32, second: u32) -> StatusSnapshot {
    let updated_at = at(second).parse().unwrap();
    StatusSnapshot::new(JobId::from(JOB), state, progress).with_updated_at(updated_at)
}

fn config(push_enabled: bool) -> TrackerConfig {
    TrackerConfig {
        push_enabled,
        retry: RetryPolicy::no_retries(Duration::from_secs(5)),
        reconnect: ReconnectPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        },
        poll_interval: Duration::from_secs(2),
    }
}

fn start(client: &Arc<ScriptedClient>, push: &Arc<ScriptedPush>, push_enabled: bool) -> WorkflowHandle {
    let (tracker, handle) = WorkflowTracker::new(Arc::clone(client), Arc::clone(push), config(push_enabled));
    tracker.start();
    handle
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_push_happy_path() {
    let client = Arc::new(ScriptedClient::default());
    let push = Arc::new(ScriptedPush::new(vec![Connection::Hold(vec![
        frame("running", 10, 1),
        frame("running", 55, 2),
        frame("succeeded", 100, 3),
    ])]));
    let handle = start(&client, &push, true);

    let run = handle.submit(JobRequest::new("Rust async")).await.unwrap();
    let view = handle.settled(run).await.unwrap();

    assert_eq!(view.state, WorkflowState::Done);
    assert_eq!(view.job_id, Some(JobId::from(JOB)));
    assert!(view.artifact.is_some());
    assert_eq!(client.result_ids(), vec![JobId::from(JOB)]);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 0);
    assert_eq!(push.connects(), 1);

    let snapshot = view.snapshot.unwrap();
    let table = PhaseTable::content_pipeline();
    assert!(project(&snapshot, &table).iter().all(|p| p.status == PhaseStatus::Done));
}

#[tokio::test(start_paused = true)]
async fn test_push_degrades_to_polling() {
    let client = Arc::new(ScriptedClient::with_statuses(vec![
        Ok(snapshot(LifecycleState::Running, 30, 1)),
        Ok(snapshot(LifecycleState::Running, 60, 2)),
        Ok(snapshot(LifecycleState::Succeeded, 100, 3)),
    ]));
    let push = Arc::new(ScriptedPush::default());
    let handle = start(&client, &push, true);

    let run = handle.submit(JobRequest::new("Rust async")).await.unwrap();

    // 100 + 200 + 400 + 800 ms of backoff between the five refused attempts.
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    let view = handle.view();
    assert_eq!(view.state, WorkflowState::PollActive);
    assert!(view.push_downgraded);
    assert_eq!(push.connects(), 5);

    let view = handle.settled(run).await.unwrap();
    assert_eq!(view.state, WorkflowState::Done);
    assert!(view.push_downgraded);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(client.result_ids().len(), 1);

    // Push is never retried for this job.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(push.connects(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_poll_snapshots_drive_projection_after_downgrade() {
    let client = Arc::new(ScriptedClient::with_statuses(vec![Ok(snapshot(
        LifecycleState::Running,
        40,
        1,
    ))]));
    let push = Arc::new(ScriptedPush::default());
    let handle = start(&client, &push, true);

    handle.submit(JobRequest::new("Rust async")).await.unwrap();
    // Polling starts after the fifth refusal at 1.5s; the second fetch is due at 3.5s.
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let view = handle.view();
    assert_eq!(view.state, WorkflowState::PollActive);
    let snapshot = view.snapshot.unwrap();
    assert_eq!(snapshot.progress, 40);
    let table = PhaseTable::content_pipeline();
    assert_eq!(current_phase(&snapshot, &table).unwrap().key, "text_generation");

    handle.reset().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_snapshot_is_rejected() {
    let client = Arc::new(ScriptedClient::default());
    let push = Arc::new(ScriptedPush::new(vec![Connection::Hold(vec![
        frame("running", 80, 2),
        frame("running", 50, 1),
    ])]));
    let handle = start(&client, &push, true);

    handle.submit(JobRequest::new("Rust async")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let view = handle.view();
    assert_eq!(view.state, WorkflowState::PushActive);
    assert_eq!(view.connection, ConnectionState::ConnectedPush);
    assert_eq!(view.snapshot.unwrap().progress, 80);
}

#[tokio::test(start_paused = true)]
async fn test_stale_terminal_push_frame_hands_over_to_polling() {
    let client = Arc::new(ScriptedClient::with_statuses(vec![Ok(snapshot(
        LifecycleState::Succeeded,
        100,
        4,
    ))]));
    let push = Arc::new(ScriptedPush::new(vec![Connection::Hold(vec![
        frame("running", 80, 2),
        frame("succeeded", 100, 1),
    ])]));
    let handle = start(&client, &push, true);

    let run = handle.submit(JobRequest::new("Rust async")).await.unwrap();
    let view = tokio::time::timeout(Duration::from_secs(60), handle.settled(run))
        .await
        .expect("workflow should settle")
        .unwrap();

    assert_eq!(view.state, WorkflowState::Done);
    assert!(!view.push_downgraded);
    assert_eq!(push.connects(), 1);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.result_ids(), vec![JobId::from(JOB)]);
}

#[tokio::test(start_paused = true)]
async fn test_job_failure_is_surfaced() {
    let client = Arc::new(ScriptedClient::default());
    let failed = format!(
        "event: workflow_failed\ndata: {{\"progress\":63,\"error\":\"provider quota exceeded\",\"updatedAt\":\"{}\"}}\n\n",
        at(2)
    );
    let push = Arc::new(ScriptedPush::new(vec![Connection::Hold(vec![
        frame("running", 40, 1),
        failed,
    ])]));
    let handle = start(&client, &push, true);

    let run = handle.submit(JobRequest::new("Rust async")).await.unwrap();
    let view = handle.settled(run).await.unwrap();

    assert_eq!(view.state, WorkflowState::Failed);
    let error = view.error.unwrap();
    assert_eq!(error.origin, ErrorOrigin::Job);
    assert_eq!(error.message, "provider quota exceeded");
    assert!(client.result_ids().is_empty());

    let snapshot = view.snapshot.unwrap();
    let table = PhaseTable::content_pipeline();
    let phases = project(&snapshot, &table);
    let statuses: Vec<_> = phases.iter().map(|p| (p.descriptor.key.as_str(), p.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("keyword_research", PhaseStatus::Done),
            ("content_outline", PhaseStatus::Done),
            ("text_generation", PhaseStatus::Done),
            ("image_generation", PhaseStatus::Failed),
            ("assembly", PhaseStatus::NotStarted),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_result_failure_retracks_job() {
    let client = Arc::new(
        ScriptedClient::default().with_results(vec![Err(JobClientError::Transient("gateway timeout".into()))]),
    );
    let push = Arc::new(ScriptedPush::new(vec![
        Connection::Hold(vec![frame("succeeded", 100, 3)]),
        Connection::Hold(vec![frame("succeeded", 100, 3)]),
    ]));
    let handle = start(&client, &push, true);

    let first = handle.submit(JobRequest::new("Rust async")).await.unwrap();
    let view = handle.settled(first).await.unwrap();
    assert_eq!(view.state, WorkflowState::Failed);
    assert_eq!(view.error.as_ref().unwrap().origin, ErrorOrigin::Result);
    assert!(view.error.unwrap().retryable);

    let second = handle.retry().await.unwrap();
    let view = handle.settled(second).await.unwrap();

    assert_eq!(view.state, WorkflowState::Done);
    assert_eq!(client.submits.load(Ordering::SeqCst), 1);
    assert_eq!(client.result_ids(), vec![JobId::from(JOB), JobId::from(JOB)]);
    assert_eq!(push.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_idempotent() {
    let client = Arc::new(ScriptedClient::default());
    let push = Arc::new(ScriptedPush::new(vec![Connection::Hold(vec![frame("running", 10, 1)])]));
    let handle = start(&client, &push, true);

    handle.submit(JobRequest::new("Rust async")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.view().state, WorkflowState::PushActive);

    handle.reset().await.unwrap();
    handle.reset().await.unwrap();

    let view = handle.view();
    assert_eq!(view.state, WorkflowState::Idle);
    assert_eq!(view.connection, ConnectionState::Idle);
    assert!(view.snapshot.is_none());
    assert!(view.job_id.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(push.connects(), 1);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 0);
    assert!(client.result_ids().is_empty());
}
