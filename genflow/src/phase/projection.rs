//! Projection of a status snapshot onto a phase table.

use std::fmt;

use serde_json::Value;

use super::table::{PhaseDescriptor, PhaseTable};
use crate::job::{LifecycleState, PhaseReportStatus, StatusSnapshot};

/// Derived status of one phase. Never stored, always recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    NotStarted,
    Active,
    Done,
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Active => write!(f, "active"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A phase as seen through one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedPhase<'a> {
    pub descriptor: &'a PhaseDescriptor,
    pub status: PhaseStatus,

    /// Phase-scoped payload from the backend, if any.
    pub payload: Option<&'a Value>,

    pub log_message: Option<&'a str>,

    /// Completion within this phase, 0..=100.
    pub progress: u8,
}

/// Project `snapshot` onto `table`.
///
/// Status comes from where the clamped progress falls relative to each
/// phase's range. An explicit `done` or `failed` in the per-phase report
/// overrides that; `pending`/`active` reports are ignored because the scalar
/// progress is authoritative for them. A failed lifecycle marks the phase
/// containing the progress (the last phase at 100) as failed, and a
/// succeeded lifecycle marks every phase done.
pub fn project<'a>(snapshot: &'a StatusSnapshot, table: &'a PhaseTable) -> Vec<ProjectedPhase<'a>> {
    let progress = snapshot.clamped_progress();
    let failed_index = match snapshot.lifecycle_state {
        LifecycleState::Failed => Some(table.index_at(snapshot.progress)),
        _ => None,
    };

    table
        .phases()
        .iter()
        .enumerate()
        .map(|(index, descriptor)| {
            let report = snapshot.phase_report(&descriptor.key);

            let mut status = range_status(descriptor, progress);
            match report.and_then(|r| r.status) {
                Some(PhaseReportStatus::Done) => status = PhaseStatus::Done,
                Some(PhaseReportStatus::Failed) => status = PhaseStatus::Failed,
                _ => {}
            }
            if snapshot.lifecycle_state == LifecycleState::Succeeded {
                status = PhaseStatus::Done;
            }
            if failed_index == Some(index) {
                status = PhaseStatus::Failed;
            }

            let phase_progress = report
                .and_then(|r| r.progress)
                .map(|p| p.clamp(0, 100) as u8)
                .unwrap_or_else(|| derived_progress(descriptor, progress, status));

            ProjectedPhase {
                descriptor,
                status,
                payload: report.and_then(|r| r.payload.as_ref()),
                log_message: report.and_then(|r| r.log_message.as_deref()),
                progress: phase_progress,
            }
        })
        .collect()
}

/// The phase containing the snapshot's clamped progress.
pub fn current_phase<'a>(snapshot: &StatusSnapshot, table: &'a PhaseTable) -> Option<&'a PhaseDescriptor> {
    table.phase_at(snapshot.progress)
}

fn range_status(descriptor: &PhaseDescriptor, progress: u8) -> PhaseStatus {
    if progress < descriptor.start {
        PhaseStatus::NotStarted
    } else if progress >= descriptor.end {
        PhaseStatus::Done
    } else {
        PhaseStatus::Active
    }
}

fn derived_progress(descriptor: &PhaseDescriptor, progress: u8, status: PhaseStatus) -> u8 {
    match status {
        PhaseStatus::Done => 100,
        _ if progress <= descriptor.start => 0,
        _ if progress >= descriptor.end => 100,
        _ => {
            let span = u32::from(descriptor.end - descriptor.start);
            let into = u32::from(progress - descriptor.start);
            (into * 100 / span) as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, PhaseReport};
    use proptest::prelude::*;

    fn snapshot(state: LifecycleState, progress: i32) -> StatusSnapshot {
        StatusSnapshot::new(JobId::from("abc"), state, progress)
    }

    fn statuses(projection: &[ProjectedPhase<'_>]) -> Vec<PhaseStatus> {
        projection.iter().map(|p| p.status).collect()
    }

    #[test]
    fn test_projection_mid_pipeline() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Running, 47);

        let projection = project(&snap, &table);

        assert_eq!(
            statuses(&projection),
            vec![
                PhaseStatus::Done,
                PhaseStatus::Done,
                PhaseStatus::Active,
                PhaseStatus::NotStarted,
                PhaseStatus::NotStarted,
            ]
        );
        // 47 is 12 of 25 points into text_generation.
        assert_eq!(projection[2].progress, 48);
        assert_eq!(projection[0].progress, 100);
        assert_eq!(projection[4].progress, 0);
    }

    #[test]
    fn test_projection_clamps_progress() {
        let table = PhaseTable::content_pipeline();

        let below = snapshot(LifecycleState::Running, -10);
        assert_eq!(project(&below, &table)[0].status, PhaseStatus::Active);

        let above = snapshot(LifecycleState::Running, 140);
        assert!(project(&above, &table)
            .iter()
            .all(|p| p.status == PhaseStatus::Done));
    }

    #[test]
    fn test_failed_lifecycle_marks_active_phase() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Failed, 63).with_error("provider quota exceeded");

        let projection = project(&snap, &table);

        assert_eq!(
            statuses(&projection),
            vec![
                PhaseStatus::Done,
                PhaseStatus::Done,
                PhaseStatus::Done,
                PhaseStatus::Failed,
                PhaseStatus::NotStarted,
            ]
        );
        assert_eq!(current_phase(&snap, &table).unwrap().key, "image_generation");
    }

    #[test]
    fn test_failed_at_hundred_marks_last_phase() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Failed, 100);

        let projection = project(&snap, &table);

        assert_eq!(projection[4].status, PhaseStatus::Failed);
        assert!(projection[..4].iter().all(|p| p.status == PhaseStatus::Done));
    }

    #[test]
    fn test_failed_lifecycle_wins_over_done_report() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Failed, 70).with_phase_report(
            "image_generation",
            PhaseReport {
                status: Some(PhaseReportStatus::Done),
                ..Default::default()
            },
        );

        assert_eq!(project(&snap, &table)[3].status, PhaseStatus::Failed);
    }

    #[test]
    fn test_done_report_overlays_range_status() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Running, 10).with_phase_report(
            "keyword_research",
            PhaseReport {
                status: Some(PhaseReportStatus::Done),
                payload: Some(serde_json::json!(["rust", "tokio"])),
                log_message: Some("found 2 keywords".into()),
                ..Default::default()
            },
        );

        let projection = project(&snap, &table);

        assert_eq!(projection[0].status, PhaseStatus::Done);
        assert_eq!(projection[0].progress, 100);
        assert_eq!(projection[0].payload, Some(&serde_json::json!(["rust", "tokio"])));
        assert_eq!(projection[0].log_message, Some("found 2 keywords"));
    }

    #[test]
    fn test_active_report_does_not_override_progress() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Running, 10).with_phase_report(
            "assembly",
            PhaseReport {
                status: Some(PhaseReportStatus::Active),
                progress: Some(40),
                ..Default::default()
            },
        );

        let projection = project(&snap, &table);

        assert_eq!(projection[4].status, PhaseStatus::NotStarted);
        assert_eq!(projection[4].progress, 40);
    }

    #[test]
    fn test_reports_for_unknown_phases_are_ignored() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Running, 30).with_phase_report(
            "translation",
            PhaseReport {
                status: Some(PhaseReportStatus::Failed),
                ..Default::default()
            },
        );

        let projection = project(&snap, &table);
        assert!(projection.iter().all(|p| p.status != PhaseStatus::Failed));
    }

    #[test]
    fn test_succeeded_marks_all_done() {
        let table = PhaseTable::content_pipeline();
        let snap = snapshot(LifecycleState::Succeeded, 95);

        assert!(project(&snap, &table)
            .iter()
            .all(|p| p.status == PhaseStatus::Done));
    }

    /// Valid tables from up to seven distinct cut points in 1..100.
    fn arb_table() -> impl Strategy<Value = PhaseTable> {
        proptest::collection::btree_set(1u8..100, 0..8).prop_map(|cuts| {
            let bounds: Vec<u8> = std::iter::once(0).chain(cuts).chain(std::iter::once(100)).collect();
            let phases = bounds
                .windows(2)
                .enumerate()
                .map(|(i, w)| PhaseDescriptor::new(format!("phase_{i}"), format!("Phase {i}"), "", w[0], w[1]))
                .collect();
            PhaseTable::new(phases).unwrap()
        })
    }

    proptest! {
        /// Property: on any valid table, a running job below 100 has exactly
        /// one active phase, the one whose range holds the progress.
        #[test]
        fn prop_any_table_has_one_active_phase(table in arb_table(), progress in 0i32..100) {
            let snap = snapshot(LifecycleState::Running, progress);
            let projection = project(&snap, &table);

            let active: Vec<_> = projection
                .iter()
                .filter(|p| p.status == PhaseStatus::Active)
                .collect();

            prop_assert_eq!(active.len(), 1);
            prop_assert!(active[0].descriptor.contains(progress as u8));
        }

        /// Property: on any valid table, at 100 nothing is active and the last phase is done.
        #[test]
        fn prop_any_table_is_done_at_hundred(table in arb_table(), extra in 0i32..1000) {
            let snap = snapshot(LifecycleState::Running, 100 + extra);
            let projection = project(&snap, &table);

            prop_assert_eq!(projection.len(), table.phases().len());
            prop_assert!(projection.iter().all(|p| p.status != PhaseStatus::Active));
            prop_assert_eq!(projection.last().map(|p| p.status), Some(PhaseStatus::Done));
        }

        /// Property: a running job below 100 has exactly one active phase.
        #[test]
        fn prop_exactly_one_active_phase(progress in 0i32..100) {
            let table = PhaseTable::content_pipeline();
            let snap = snapshot(LifecycleState::Running, progress);

            let active = project(&snap, &table)
                .iter()
                .filter(|p| p.status == PhaseStatus::Active)
                .count();

            prop_assert_eq!(active, 1);
        }

        /// Property: at 100 no phase is active and the last phase is done.
        #[test]
        fn prop_no_active_phase_at_hundred(extra in 0i32..1000) {
            let table = PhaseTable::content_pipeline();
            let snap = snapshot(LifecycleState::Running, 100 + extra);

            let projection = project(&snap, &table);

            prop_assert!(projection.iter().all(|p| p.status != PhaseStatus::Active));
            prop_assert_eq!(projection.last().map(|p| p.status), Some(PhaseStatus::Done));
        }

        /// Property: statuses are monotone along the table (done, then active, then not started).
        #[test]
        fn prop_statuses_are_ordered(progress in -50i32..150) {
            let table = PhaseTable::content_pipeline();
            let snap = snapshot(LifecycleState::Queued, progress);

            let rank = |s: PhaseStatus| match s {
                PhaseStatus::Done => 0,
                PhaseStatus::Active => 1,
                PhaseStatus::NotStarted => 2,
                PhaseStatus::Failed => 3,
            };
            let ranks: Vec<_> = project(&snap, &table).iter().map(|p| rank(p.status)).collect();

            prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
