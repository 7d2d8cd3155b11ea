//! Wire types for jobs, status snapshots and results.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Opaque job handle issued by the backend.
///
/// Immutable for the life of one run. An empty id only appears transiently
/// while decoding events that omit it; decoders fill it in from context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a backend-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no identifier was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Backend lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Accepted but not yet picked up.
    #[serde(alias = "pending", alias = "submitted")]
    Queued,
    /// Being worked on.
    #[serde(alias = "processing", alias = "in_progress", alias = "active")]
    Running,
    /// Finished; the result may be fetched.
    #[serde(alias = "completed", alias = "success", alias = "done")]
    Succeeded,
    /// Finished with an error.
    #[serde(alias = "error")]
    Failed,
}

impl LifecycleState {
    /// Returns true once no further snapshots are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Status the backend reports for a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseReportStatus {
    #[serde(alias = "not_started", alias = "queued")]
    Pending,
    #[serde(alias = "running", alias = "in_progress", alias = "processing")]
    Active,
    #[serde(alias = "completed", alias = "succeeded", alias = "success")]
    Done,
    #[serde(alias = "error")]
    Failed,
}

/// Optional per-phase detail supplied alongside a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseReportStatus>,

    #[serde(
        default,
        deserialize_with = "deserialize_optional_progress",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<i32>,

    /// Phase-scoped payload (e.g. the keywords found, the outline drafted).
    #[serde(default, alias = "data", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(
        default,
        alias = "log_message",
        alias = "log",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_message: Option<String>,
}

/// One observation of a job's status.
///
/// Snapshots are read-only on the client. `progress` is kept exactly as
/// received; use [`StatusSnapshot::clamped_progress`] for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default, alias = "job_id")]
    pub job_id: JobId,

    #[serde(alias = "lifecycle_state", alias = "status", alias = "state")]
    pub lifecycle_state: LifecycleState,

    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: i32,

    #[serde(
        default,
        alias = "current_phase_label",
        alias = "currentPhase",
        alias = "current_phase",
        alias = "currentStep",
        alias = "current_step",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_phase_label: Option<String>,

    #[serde(
        default,
        alias = "per_phase",
        alias = "phases",
        alias = "steps",
        skip_serializing_if = "Option::is_none"
    )]
    pub per_phase: Option<BTreeMap<String, PhaseReport>>,

    #[serde(
        default,
        alias = "error_message",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,

    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "updated_at", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Create a bare snapshot with no phase detail or timestamps.
    pub fn new(job_id: JobId, lifecycle_state: LifecycleState, progress: i32) -> Self {
        Self {
            job_id,
            lifecycle_state,
            progress,
            current_phase_label: None,
            per_phase: None,
            error_message: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the `updatedAt` timestamp.
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Set the error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Set the current phase label.
    pub fn with_phase_label(mut self, label: impl Into<String>) -> Self {
        self.current_phase_label = Some(label.into());
        self
    }

    /// Attach a per-phase report.
    pub fn with_phase_report(mut self, key: impl Into<String>, report: PhaseReport) -> Self {
        self.per_phase
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), report);
        self
    }

    /// Progress clamped into `0..=100`.
    pub fn clamped_progress(&self) -> u8 {
        self.progress.clamp(0, 100) as u8
    }

    /// Returns true if the job has reached a terminal lifecycle state.
    pub fn is_terminal(&self) -> bool {
        self.lifecycle_state.is_terminal()
    }

    /// Per-phase report for `key`, if the backend supplied one.
    pub fn phase_report(&self, key: &str) -> Option<&PhaseReport> {
        self.per_phase.as_ref().and_then(|phases| phases.get(key))
    }

    /// Returns true if this snapshot is strictly older than `held`.
    ///
    /// Only comparable when both carry `updatedAt`; a snapshot without a
    /// timestamp is never considered stale.
    pub fn is_older_than(&self, held: &StatusSnapshot) -> bool {
        match (self.updated_at, held.updated_at) {
            (Some(incoming), Some(current)) => incoming < current,
            _ => false,
        }
    }
}

/// Payload submitted to start a job.
///
/// `topic` and `keywords` are the fields every backend understands; any
/// additional fields are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[serde(default)]
    pub topic: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl JobRequest {
    /// Create a request for a topic with no keywords.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            keywords: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Add seed keywords.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }
}

/// Outcome of a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub initial_state: LifecycleState,
}

/// Final result of a succeeded job, carried as opaque JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct JobArtifact {
    pub job_id: JobId,
    pub content: Value,
}

/// Integer or float progress as sent over the wire.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProgressRepr {
    Int(i64),
    Float(f64),
}

impl ProgressRepr {
    fn into_progress(self) -> i32 {
        match self {
            Self::Int(v) => v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            // `as` saturates and maps NaN to 0.
            Self::Float(v) => v.round() as i32,
        }
    }
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_progress(deserializer)?.unwrap_or(0))
}

fn deserialize_optional_progress<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ProgressRepr>::deserialize(deserializer)?.map(ProgressRepr::into_progress))
}
