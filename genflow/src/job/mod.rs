//! Job data model shared by every transport.
//!
//! A job is identified by a [`JobId`] handed out by the backend on submit.
//! Its progress arrives as a sequence of [`StatusSnapshot`]s (from the push
//! channel or the poll loop) and, once the job has succeeded, a single
//! [`JobArtifact`] is fetched.
//!
//! The wire types are tolerant of the naming variations different backend
//! versions produce (camelCase or snake_case keys, lifecycle synonyms,
//! float progress values).

mod model;

pub use model::{
    JobArtifact, JobId, JobRequest, LifecycleState, PhaseReport, PhaseReportStatus,
    StatusSnapshot, SubmitReceipt,
};
