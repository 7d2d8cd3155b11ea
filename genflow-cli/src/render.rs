//! Plain-text rendering of workflow progress.

use genflow::job::StatusSnapshot;
use genflow::phase::{current_phase, project, PhaseStatus, PhaseTable};
use genflow::reconcile::{WorkflowState, WorkflowView};

fn marker(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::NotStarted => "[ ]",
        PhaseStatus::Active => "[>]",
        PhaseStatus::Done => "[x]",
        PhaseStatus::Failed => "[!]",
    }
}

/// One line per phase: marker, title, phase progress and log message.
pub fn render_phases(snapshot: &StatusSnapshot, table: &PhaseTable) -> String {
    let width = table
        .phases()
        .iter()
        .map(|p| p.title.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for phase in project(snapshot, table) {
        let line = format!(
            "  {} {:<width$}  {:>3}%",
            marker(phase.status),
            phase.descriptor.title,
            phase.progress,
        );
        out.push_str(&line);
        if let Some(message) = phase.log_message {
            out.push_str("  ");
            out.push_str(message);
        }
        out.push('\n');
    }
    out
}

/// Summary line for a view, e.g. `push-active   55%  Text generation`.
pub fn render_summary(view: &WorkflowView, table: &PhaseTable) -> String {
    match &view.snapshot {
        Some(snapshot) => {
            let phase = snapshot
                .current_phase_label
                .clone()
                .or_else(|| current_phase(snapshot, table).map(|p| p.title.clone()))
                .unwrap_or_default();
            format!(
                "{:<12} {:>3}%  {}",
                view.state.to_string(),
                snapshot.clamped_progress(),
                phase
            )
            .trim_end()
            .to_string()
        }
        None => view.state.to_string(),
    }
}

/// Turns a stream of views into the lines worth printing.
///
/// Only changes are reported: a new summary, a new warning, or the job id
/// becoming known.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    last_summary: Option<String>,
    last_warning: Option<String>,
    job_announced: bool,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, view: &WorkflowView, table: &PhaseTable) -> Vec<String> {
        let mut lines = Vec::new();

        if !self.job_announced {
            if let Some(job_id) = &view.job_id {
                lines.push(format!("Job {job_id}"));
                self.job_announced = true;
            }
        }

        if view.warning.is_some() && view.warning != self.last_warning {
            if let Some(warning) = &view.warning {
                lines.push(format!("warning: {warning}"));
            }
        }
        self.last_warning = view.warning.clone();

        if view.state != WorkflowState::Idle {
            let summary = render_summary(view, table);
            if self.last_summary.as_ref() != Some(&summary) {
                lines.push(summary.clone());
                self.last_summary = Some(summary);
            }
        }
        lines
    }
}
