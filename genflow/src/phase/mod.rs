//! Phase projection.
//!
//! The backend reports a single scalar progress value. A [`PhaseTable`]
//! splits the 0..100 range into named phases, and [`project`] derives the
//! status of every phase from a [`StatusSnapshot`](crate::job::StatusSnapshot),
//! overlaying the explicit per-phase detail the backend may send.
//!
//! # Usage
//!
//! ```ignore
//! let table = PhaseTable::content_pipeline();
//! for phase in project(&snapshot, &table) {
//!     println!("{:<20} {}", phase.descriptor.title, phase.status);
//! }
//! ```

mod projection;
mod table;

pub use projection::{current_phase, project, PhaseStatus, ProjectedPhase};
pub use table::{PhaseDescriptor, PhaseTable, PhaseTableError};
