//! State types owned by the reconciler.

use std::fmt;

use crate::job::{JobArtifact, JobId, StatusSnapshot};

/// Sequence number of a submit/track/retry. Outcomes of older runs are
/// ignored.
pub type RunId = u64;

/// Workflow lifecycle as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    /// Submit request in flight.
    Submitting,
    /// Job id known, waiting for the push channel to open.
    Starting,
    PushActive,
    PollActive,
    /// Job succeeded, result fetch in flight.
    Completing,
    Done,
    Failed,
}

impl WorkflowState {
    /// Returns true once the run has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true while status snapshots are being accepted.
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Starting | Self::PushActive | Self::PollActive)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Submitting => write!(f, "submitting"),
            Self::Starting => write!(f, "starting"),
            Self::PushActive => write!(f, "push-active"),
            Self::PollActive => write!(f, "poll-active"),
            Self::Completing => write!(f, "completing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Which transport is feeding snapshots, and whether it is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    ConnectingPush,
    ConnectedPush,
    ConnectingPoll,
    ConnectedPoll,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ConnectingPush => write!(f, "connecting-push"),
            Self::ConnectedPush => write!(f, "connected-push"),
            Self::ConnectingPoll => write!(f, "connecting-poll"),
            Self::ConnectedPoll => write!(f, "connected-poll"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Where an unrecovered error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// The submit call failed.
    Submit,
    /// The job itself reported failure.
    Job,
    /// Status could no longer be obtained (e.g. the job id is unknown).
    Transport,
    /// The result fetch failed after the job succeeded.
    Result,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::Job => write!(f, "job"),
            Self::Transport => write!(f, "transport"),
            Self::Result => write!(f, "result"),
        }
    }
}

/// The single error surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowError {
    pub origin: ErrorOrigin,
    pub message: String,
    /// Whether a retry has a reasonable chance of succeeding.
    pub retryable: bool,
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.origin, self.message)
    }
}

/// Read-only view of the reconciler, published after every event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowView {
    pub run: RunId,
    pub state: WorkflowState,
    pub connection: ConnectionState,
    pub job_id: Option<JobId>,

    /// Most recently accepted snapshot, regardless of transport.
    pub snapshot: Option<StatusSnapshot>,

    pub artifact: Option<JobArtifact>,
    pub error: Option<WorkflowError>,

    /// Last absorbed transient problem (push fallback, poll warning).
    pub warning: Option<String>,

    /// The push channel was abandoned for this run.
    pub push_downgraded: bool,
}
