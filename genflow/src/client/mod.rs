//! Job client: submit, status and result calls against the backend.
//!
//! # Architecture
//!
//! ```text
//! RetryingClient<C>        timeout per attempt, bounded exponential retry
//!        │
//!        ▼
//! C: JobClient             HttpJobClient (reqwest) or SimulatedJobClient
//! ```
//!
//! Errors are classified into [`JobClientError`]; only transient errors are
//! retried, and the caller sees every other error on first occurrence.

mod error;
mod http;
mod retry;
mod simulated;
mod traits;

pub use error::JobClientError;
pub use http::HttpJobClient;
pub(crate) use http::Endpoints;
pub use retry::{RetryPolicy, RetryingClient};
pub use simulated::{SimulatedJobClient, DEFAULT_SIMULATED_STEP};
pub use traits::JobClient;
