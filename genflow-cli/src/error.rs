//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process;

use genflow::client::JobClientError;
use genflow::job::JobId;
use genflow::config::ConfigFileError;
use genflow::push::PushError;
use genflow::reconcile::{ErrorOrigin, TrackerError, WorkflowError};

/// Exit code used when the user interrupts a running command.
const EXIT_INTERRUPTED: i32 = 130;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start the async runtime
    Runtime(io::Error),
    /// Failed to read a job request file
    RequestFile { path: PathBuf, error: io::Error },
    /// Job request could not be built from the arguments
    InvalidRequest(String),
    /// A direct job client call failed
    Client(JobClientError),
    /// The push transport could not be created
    Push(PushError),
    /// The tracker stopped unexpectedly
    Tracker(TrackerError),
    /// The followed workflow ended in failure
    Workflow {
        error: WorkflowError,
        job_id: Option<JobId>,
    },
    /// Failed to print command output
    Output(String),
    /// Interrupted by Ctrl+C
    Interrupted,
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        if matches!(self, CliError::Interrupted) {
            eprintln!("Interrupted");
            process::exit(EXIT_INTERRUPTED);
        }

        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Client(JobClientError::Transient(_)) => {
                eprintln!();
                eprintln!("The backend could not be reached. Check that:");
                eprintln!("  1. The backend is running");
                eprintln!("  2. [backend] url in the config file points at it (genflow config show)");
            }
            CliError::Workflow { .. } => {
                if let Some(hint) = self.retry_hint() {
                    eprintln!();
                    eprintln!("{}", hint);
                }
            }
            _ => {}
        }

        process::exit(1)
    }

    /// How to retry a retryable workflow failure.
    ///
    /// When the job itself is still usable (its result fetch or status
    /// transport failed) following it again with `watch` avoids submitting a
    /// duplicate job.
    pub fn retry_hint(&self) -> Option<String> {
        let CliError::Workflow { error, job_id } = self else {
            return None;
        };
        if !error.retryable {
            return None;
        }
        match (error.origin, job_id) {
            (ErrorOrigin::Result | ErrorOrigin::Transport, Some(job_id)) => Some(format!(
                "The job may still be available; run `genflow watch {}` to follow it again.",
                job_id
            )),
            _ => Some("The failure may be temporary; run the command again to retry.".to_string()),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::RequestFile { path, error } => {
                write!(f, "Failed to read request file '{}': {}", path.display(), error)
            }
            CliError::InvalidRequest(msg) => write!(f, "Invalid job request: {}", msg),
            CliError::Client(e) => write!(f, "{}", e),
            CliError::Push(e) => write!(f, "Push channel error: {}", e),
            CliError::Tracker(e) => write!(f, "{}", e),
            CliError::Workflow { error, .. } => write!(f, "Job failed ({})", error),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::RequestFile { error, .. } => Some(error),
            CliError::Client(e) => Some(e),
            CliError::Push(e) => Some(e),
            CliError::Tracker(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<JobClientError> for CliError {
    fn from(e: JobClientError) -> Self {
        CliError::Client(e)
    }
}

impl From<PushError> for CliError {
    fn from(e: PushError) -> Self {
        CliError::Push(e)
    }
}

impl From<TrackerError> for CliError {
    fn from(e: TrackerError) -> Self {
        CliError::Tracker(e)
    }
}
