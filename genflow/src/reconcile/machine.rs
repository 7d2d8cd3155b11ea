//! The reconciler state machine.
//!
//! [`Reconciler::handle`] consumes one [`Event`] and returns the
//! [`Command`]s the driver must execute. It performs no I/O and holds no
//! locks; the tracker serializes all events through one task.
//!
//! # Transitions
//!
//! ```text
//! Idle ─submit─► Submitting ─ok─► Starting ─opened─► PushActive ─push failed─► PollActive
//!                    │               │  (push disabled) ──────────────────────►    │
//!                    │               └──────────── succeeded ──► Completing ◄──────┘
//!                    │                                              │
//!                    └─error─► Failed ◄──── failed / lost ───────── ├─error─► Failed
//!                                │                                  └─result─► Done
//!                                └─retry─► Submitting | Starting
//! ```
//!
//! Any state goes back to `Idle` on reset; a new submit or track first
//! tears down whatever the previous run left running.

use std::time::Duration;

use super::state::{
    ConnectionState, ErrorOrigin, RunId, WorkflowError, WorkflowState, WorkflowView,
};
use crate::client::JobClientError;
use crate::job::{JobArtifact, JobId, JobRequest, LifecycleState, StatusSnapshot, SubmitReceipt};

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Submit a new job, abandoning any current one.
    Submit(JobRequest),

    /// Follow an existing job id, abandoning any current one.
    Track(JobId),

    SubmitCompleted {
        run: RunId,
        outcome: Result<SubmitReceipt, JobClientError>,
    },

    PushOpened,
    PushSnapshot(StatusSnapshot),
    PushReconnecting { attempt: u32, delay: Duration },
    PushClosed,
    PushFailed { attempts: u32, reason: String },

    PollSnapshot(StatusSnapshot),
    PollWarning(JobClientError),
    PollFailed(JobClientError),

    ResultCompleted {
        run: RunId,
        outcome: Result<JobArtifact, JobClientError>,
    },

    /// Retry after a failure.
    Retry,

    /// Abandon the current job and clear all state.
    Reset,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Submit { run: RunId, request: JobRequest },
    OpenPush { job_id: JobId },
    ClosePush,
    StartPoll { job_id: JobId },
    StopPoll,
    FetchResult { run: RunId, job_id: JobId },
    /// Cancel in-flight submit/result requests, including backoff sleeps.
    AbortRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Push,
    Poll,
}

/// Sans-IO workflow state machine.
#[derive(Debug)]
pub struct Reconciler {
    push_enabled: bool,
    view: WorkflowView,
    request: Option<JobRequest>,
    transport: Option<Transport>,
    request_in_flight: bool,
    result_requested: bool,
}

impl Reconciler {
    pub fn new(push_enabled: bool) -> Self {
        Self {
            push_enabled,
            view: WorkflowView::default(),
            request: None,
            transport: None,
            request_in_flight: false,
            result_requested: false,
        }
    }

    pub fn view(&self) -> &WorkflowView {
        &self.view
    }

    pub fn state(&self) -> WorkflowState {
        self.view.state
    }

    pub fn connection(&self) -> ConnectionState {
        self.view.connection
    }

    pub fn run(&self) -> RunId {
        self.view.run
    }

    /// Apply one event and return the commands to execute, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        let mut commands = Vec::new();

        match event {
            Event::Submit(request) => self.submit(request, &mut commands),
            Event::Track(job_id) => {
                self.begin_run(&mut commands);
                self.request = None;
                self.track(job_id, &mut commands);
            }
            Event::SubmitCompleted { run, outcome } => self.submit_completed(run, outcome, &mut commands),

            Event::PushOpened => {
                if self.transport == Some(Transport::Push) {
                    self.view.connection = ConnectionState::ConnectedPush;
                    if self.view.state == WorkflowState::Starting {
                        self.transition(WorkflowState::PushActive);
                    }
                }
            }
            Event::PushSnapshot(snapshot) => {
                if self.transport == Some(Transport::Push) {
                    if self.view.state == WorkflowState::Starting {
                        self.view.connection = ConnectionState::ConnectedPush;
                        self.transition(WorkflowState::PushActive);
                    }
                    self.apply_snapshot(snapshot, &mut commands);
                } else {
                    tracing::trace!(run = self.view.run, "Ignoring push snapshot, push not active");
                }
            }
            Event::PushReconnecting { attempt, delay } => {
                if self.transport == Some(Transport::Push) {
                    self.view.connection = ConnectionState::ConnectingPush;
                    tracing::debug!(
                        run = self.view.run,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Push channel reconnecting"
                    );
                }
            }
            Event::PushClosed => self.push_closed(&mut commands),
            Event::PushFailed { attempts, reason } => self.push_failed(attempts, reason, &mut commands),

            Event::PollSnapshot(snapshot) => {
                if self.transport == Some(Transport::Poll) {
                    self.view.connection = ConnectionState::ConnectedPoll;
                    self.apply_snapshot(snapshot, &mut commands);
                } else {
                    tracing::trace!(run = self.view.run, "Ignoring poll snapshot, polling not active");
                }
            }
            Event::PollWarning(error) => {
                if self.transport == Some(Transport::Poll) {
                    self.view.warning = Some(error.to_string());
                }
            }
            Event::PollFailed(error) => {
                if self.transport == Some(Transport::Poll) && self.view.state.is_tracking() {
                    self.stop_transport(&mut commands);
                    self.fail(ErrorOrigin::Transport, error.to_string(), true);
                }
            }

            Event::ResultCompleted { run, outcome } => self.result_completed(run, outcome),

            Event::Retry => self.retry(&mut commands),

            Event::Reset => {
                self.teardown(&mut commands);
                self.view.run += 1;
                self.request = None;
                self.clear_job_state();
                self.view.job_id = None;
                self.view.connection = ConnectionState::Idle;
                self.transition(WorkflowState::Idle);
            }
        }

        commands
    }

    fn submit(&mut self, request: JobRequest, commands: &mut Vec<Command>) {
        self.begin_run(commands);
        self.request = Some(request.clone());
        self.view.job_id = None;
        self.view.connection = ConnectionState::Idle;
        self.request_in_flight = true;
        self.transition(WorkflowState::Submitting);
        commands.push(Command::Submit {
            run: self.view.run,
            request,
        });
    }

    fn submit_completed(
        &mut self,
        run: RunId,
        outcome: Result<SubmitReceipt, JobClientError>,
        commands: &mut Vec<Command>,
    ) {
        if run != self.view.run || self.view.state != WorkflowState::Submitting {
            tracing::debug!(run, current_run = self.view.run, "Ignoring stale submit outcome");
            return;
        }
        self.request_in_flight = false;

        match outcome {
            Ok(receipt) => {
                tracing::info!(
                    run,
                    job_id = %receipt.job_id,
                    initial_state = %receipt.initial_state,
                    "Job accepted"
                );
                self.track(receipt.job_id, commands);
            }
            Err(e) => {
                let retryable = e.is_retryable();
                self.fail(ErrorOrigin::Submit, e.to_string(), retryable);
            }
        }
    }

    fn push_failed(&mut self, attempts: u32, reason: String, commands: &mut Vec<Command>) {
        if self.transport != Some(Transport::Push) || !self.view.state.is_tracking() {
            return;
        }
        let Some(job_id) = self.view.job_id.clone() else {
            return;
        };

        tracing::warn!(
            run = self.view.run,
            job_id = %job_id,
            attempts,
            reason = %reason,
            "Push channel failed, falling back to polling"
        );
        self.stop_transport(commands);
        self.view.push_downgraded = true;
        self.view.warning = Some(format!(
            "push channel failed after {attempts} attempts ({reason}); polling instead"
        ));
        self.start_poll(job_id, commands);
    }

    /// The connector closes after any terminal snapshot it decodes. If we
    /// are still tracking, that snapshot was rejected, so polling takes over
    /// until an accepted terminal state arrives.
    fn push_closed(&mut self, commands: &mut Vec<Command>) {
        if self.transport != Some(Transport::Push) {
            return;
        }
        self.stop_transport(commands);
        if !self.view.state.is_tracking() {
            return;
        }
        let Some(job_id) = self.view.job_id.clone() else {
            return;
        };
        tracing::info!(
            run = self.view.run,
            job_id = %job_id,
            "Push channel closed before an accepted terminal state, polling instead"
        );
        self.start_poll(job_id, commands);
    }

    fn result_completed(&mut self, run: RunId, outcome: Result<JobArtifact, JobClientError>) {
        if run != self.view.run || self.view.state != WorkflowState::Completing {
            tracing::debug!(run, current_run = self.view.run, "Ignoring stale result outcome");
            return;
        }
        self.request_in_flight = false;

        match outcome {
            Ok(artifact) => {
                self.view.artifact = Some(artifact);
                self.transition(WorkflowState::Done);
            }
            Err(e) => {
                let retryable = e.is_retryable() || matches!(e, JobClientError::NotReady(_));
                self.fail(ErrorOrigin::Result, e.to_string(), retryable);
            }
        }
    }

    fn retry(&mut self, commands: &mut Vec<Command>) {
        if self.view.state != WorkflowState::Failed {
            tracing::debug!(state = %self.view.state, "Retry ignored, workflow has not failed");
            return;
        }
        let origin = self.view.error.as_ref().map(|e| e.origin);
        tracing::info!(run = self.view.run, origin = ?origin, "Retrying workflow");

        match (origin, self.request.clone(), self.view.job_id.clone()) {
            (Some(ErrorOrigin::Result), _, Some(job_id)) => {
                self.begin_run(commands);
                self.track(job_id, commands);
            }
            (_, Some(request), _) => self.submit(request, commands),
            (_, None, Some(job_id)) => {
                self.begin_run(commands);
                self.track(job_id, commands);
            }
            (_, None, None) => {}
        }
    }

    /// Tear down the previous run and start a new one.
    fn begin_run(&mut self, commands: &mut Vec<Command>) {
        self.teardown(commands);
        self.view.run += 1;
        self.clear_job_state();
    }

    /// Start following `job_id` on the preferred transport.
    fn track(&mut self, job_id: JobId, commands: &mut Vec<Command>) {
        self.view.job_id = Some(job_id.clone());
        if self.push_enabled && !self.view.push_downgraded {
            self.transport = Some(Transport::Push);
            self.view.connection = ConnectionState::ConnectingPush;
            self.transition(WorkflowState::Starting);
            commands.push(Command::OpenPush { job_id });
        } else {
            self.start_poll(job_id, commands);
        }
    }

    fn start_poll(&mut self, job_id: JobId, commands: &mut Vec<Command>) {
        self.transport = Some(Transport::Poll);
        self.view.connection = ConnectionState::ConnectingPoll;
        self.transition(WorkflowState::PollActive);
        commands.push(Command::StartPoll { job_id });
    }

    fn apply_snapshot(&mut self, snapshot: StatusSnapshot, commands: &mut Vec<Command>) {
        if !self.view.state.is_tracking() {
            tracing::trace!(state = %self.view.state, "Ignoring snapshot outside tracking states");
            return;
        }
        if self.view.job_id.as_ref() != Some(&snapshot.job_id) {
            tracing::debug!(
                expected = ?self.view.job_id,
                received = %snapshot.job_id,
                "Ignoring snapshot for another job"
            );
            return;
        }
        if let Some(held) = &self.view.snapshot {
            if snapshot.is_older_than(held) {
                tracing::debug!(
                    job_id = %snapshot.job_id,
                    received = ?snapshot.updated_at,
                    held = ?held.updated_at,
                    "Discarding stale snapshot"
                );
                return;
            }
        }

        tracing::debug!(
            job_id = %snapshot.job_id,
            state = %snapshot.lifecycle_state,
            progress = snapshot.progress,
            "Snapshot accepted"
        );
        let lifecycle = snapshot.lifecycle_state;
        let error_message = snapshot.error_message.clone();
        let job_id = snapshot.job_id.clone();
        self.view.snapshot = Some(snapshot);

        match lifecycle {
            LifecycleState::Succeeded => {
                self.stop_transport(commands);
                self.transition(WorkflowState::Completing);
                if !self.result_requested {
                    self.result_requested = true;
                    self.request_in_flight = true;
                    commands.push(Command::FetchResult {
                        run: self.view.run,
                        job_id,
                    });
                }
            }
            LifecycleState::Failed => {
                self.stop_transport(commands);
                let message = error_message.unwrap_or_else(|| "job failed".to_string());
                self.fail(ErrorOrigin::Job, message, true);
            }
            LifecycleState::Queued | LifecycleState::Running => {}
        }
    }

    fn fail(&mut self, origin: ErrorOrigin, message: String, retryable: bool) {
        tracing::warn!(run = self.view.run, %origin, message = %message, retryable, "Workflow failed");
        self.view.error = Some(WorkflowError {
            origin,
            message,
            retryable,
        });
        self.transition(WorkflowState::Failed);
    }

    /// Stop the active transport, if any.
    fn stop_transport(&mut self, commands: &mut Vec<Command>) {
        match self.transport.take() {
            Some(Transport::Push) => commands.push(Command::ClosePush),
            Some(Transport::Poll) => commands.push(Command::StopPoll),
            None => return,
        }
        self.view.connection = ConnectionState::Disconnected;
    }

    /// Stop everything the current run has running.
    fn teardown(&mut self, commands: &mut Vec<Command>) {
        self.stop_transport(commands);
        if self.request_in_flight {
            self.request_in_flight = false;
            commands.push(Command::AbortRequests);
        }
    }

    fn clear_job_state(&mut self) {
        self.view.snapshot = None;
        self.view.artifact = None;
        self.view.error = None;
        self.view.warning = None;
        self.view.push_downgraded = false;
        self.result_requested = false;
    }

    fn transition(&mut self, to: WorkflowState) {
        let from = self.view.state;
        if from != to {
            tracing::info!(run = self.view.run, %from, %to, "Workflow state changed");
            self.view.state = to;
        }
    }
}
