//! Transport selection and reconciliation.
//!
//! Decides which transport follows a job, merges snapshots from both into one
//! observed status, fetches the result exactly once and owns teardown.
//!
//! # Architecture
//!
//! ```text
//! WorkflowHandle ──control──► WorkflowTracker ──Event──► Reconciler
//!        ▲                      │    ▲    ▲                  │
//!        │                      │    │    └──── PollNotice ◄─┤ StartPoll / StopPoll
//!   watch<WorkflowView> ◄───────┘    └────── PushNotice ◄────┤ OpenPush / ClosePush
//!                                                            └ Submit / FetchResult
//! ```
//!
//! [`Reconciler`] is a plain state machine with no I/O; [`WorkflowTracker`]
//! executes its commands and is the only task that touches it.

mod machine;
mod state;
mod tracker;

pub use machine::{Command, Event, Reconciler};
pub use state::{ConnectionState, ErrorOrigin, RunId, WorkflowError, WorkflowState, WorkflowView};
pub use tracker::{TrackerConfig, TrackerError, WorkflowHandle, WorkflowTracker};
