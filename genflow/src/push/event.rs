//! Decoding of push-channel frames into status snapshots.

use serde_json::{Map, Value};

use super::error::PushError;
use super::sse::SseFrame;
use crate::job::{JobId, StatusSnapshot};

const LIFECYCLE_KEYS: [&str; 4] = ["lifecycleState", "lifecycle_state", "status", "state"];
const JOB_ID_KEYS: [&str; 2] = ["jobId", "job_id"];
const ERROR_KEYS: [&str; 2] = ["errorMessage", "error_message"];

/// What a named event means for the snapshot it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Status,
    Completed,
    Failed,
    KeepAlive,
    Unknown,
}

impl EventKind {
    fn of(name: &str) -> Self {
        match name {
            "message" | "status_update" | "status" | "progress" => Self::Status,
            "workflow_completed" => Self::Completed,
            "workflow_failed" => Self::Failed,
            "heartbeat" | "ping" => Self::KeepAlive,
            _ => Self::Unknown,
        }
    }
}

/// Decode a frame received on the channel for `job_id`.
///
/// Returns `Ok(None)` for keep-alives, empty frames and event names this
/// client does not understand. Terminal events fill in a missing lifecycle
/// state (and, for completion, a missing progress of 100); a missing job id
/// is taken from the channel.
pub fn decode_status_event(frame: &SseFrame, job_id: &JobId) -> Result<Option<StatusSnapshot>, PushError> {
    let kind = EventKind::of(&frame.event);
    match kind {
        EventKind::KeepAlive => return Ok(None),
        EventKind::Unknown => {
            tracing::trace!(event = %frame.event, "Ignoring unknown push event");
            return Ok(None);
        }
        _ => {}
    }
    if frame.data.trim().is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(&frame.data).map_err(|e| PushError::Parse(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(PushError::Parse(format!(
            "expected a JSON object in '{}' event",
            frame.event
        )));
    };

    if !has_any(&fields, &JOB_ID_KEYS) {
        fields.insert("jobId".into(), Value::String(job_id.as_str().to_string()));
    }

    match kind {
        EventKind::Completed => {
            if !has_any(&fields, &LIFECYCLE_KEYS) {
                fields.insert("lifecycleState".into(), Value::String("succeeded".into()));
            }
            if !fields.contains_key("progress") {
                fields.insert("progress".into(), Value::from(100));
            }
        }
        EventKind::Failed => {
            if !has_any(&fields, &LIFECYCLE_KEYS) {
                fields.insert("lifecycleState".into(), Value::String("failed".into()));
            }
            if !has_any(&fields, &ERROR_KEYS) {
                let message = fields
                    .get("error")
                    .or_else(|| fields.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(message) = message {
                    fields.insert("errorMessage".into(), Value::String(message));
                }
            }
        }
        _ => {}
    }

    serde_json::from_value(Value::Object(fields))
        .map(Some)
        .map_err(|e| PushError::Parse(e.to_string()))
}

fn has_any(fields: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|k| fields.get(*k).is_some_and(|v| !v.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::LifecycleState;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: event.to_string(),
            data: data.to_string(),
            id: None,
        }
    }

    #[test]
    fn test_status_update_event() {
        let id = JobId::from("abc");
        let snapshot = decode_status_event(
            &frame("status_update", r#"{"jobId":"abc","status":"running","progress":55}"#),
            &id,
        )
        .unwrap()
        .unwrap();

        assert_eq!(snapshot.lifecycle_state, LifecycleState::Running);
        assert_eq!(snapshot.progress, 55);
    }

    #[test]
    fn test_missing_job_id_is_filled() {
        let id = JobId::from("abc");
        let snapshot = decode_status_event(&frame("message", r#"{"state":"queued"}"#), &id)
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.job_id, id);
    }

    #[test]
    fn test_completed_event_fills_state_and_progress() {
        let id = JobId::from("abc");
        let snapshot = decode_status_event(&frame("workflow_completed", "{}"), &id)
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.lifecycle_state, LifecycleState::Succeeded);
        assert_eq!(snapshot.progress, 100);
    }

    #[test]
    fn test_completed_event_keeps_explicit_fields() {
        let id = JobId::from("abc");
        let snapshot = decode_status_event(
            &frame("workflow_completed", r#"{"status":"running","progress":99}"#),
            &id,
        )
        .unwrap()
        .unwrap();

        assert_eq!(snapshot.lifecycle_state, LifecycleState::Running);
        assert_eq!(snapshot.progress, 99);
    }

    #[test]
    fn test_failed_event_fills_state_and_error() {
        let id = JobId::from("abc");
        let snapshot = decode_status_event(
            &frame("workflow_failed", r#"{"progress":63,"error":"provider quota exceeded"}"#),
            &id,
        )
        .unwrap()
        .unwrap();

        assert_eq!(snapshot.lifecycle_state, LifecycleState::Failed);
        assert_eq!(snapshot.progress, 63);
        assert_eq!(snapshot.error_message.as_deref(), Some("provider quota exceeded"));
    }

    #[test]
    fn test_keep_alive_and_unknown_events_are_ignored() {
        let id = JobId::from("abc");
        assert_eq!(decode_status_event(&frame("heartbeat", "{}"), &id), Ok(None));
        assert_eq!(decode_status_event(&frame("ping", ""), &id), Ok(None));
        assert_eq!(decode_status_event(&frame("analytics", "{}"), &id), Ok(None));
        assert_eq!(decode_status_event(&frame("message", "  "), &id), Ok(None));
    }

    #[test]
    fn test_malformed_payloads_are_parse_errors() {
        let id = JobId::from("abc");
        assert!(matches!(
            decode_status_event(&frame("message", "{not json"), &id),
            Err(PushError::Parse(_))
        ));
        assert!(matches!(
            decode_status_event(&frame("message", "[1,2]"), &id),
            Err(PushError::Parse(_))
        ));
        // A status update must say which lifecycle state it reports.
        assert!(matches!(
            decode_status_event(&frame("status_update", r#"{"progress":5}"#), &id),
            Err(PushError::Parse(_))
        ));
    }
}
