//! Logging infrastructure for genflow.
//!
//! Provides structured logging with file output and optional console output:
//! - Writes to the configured log file (cleared on session start)
//! - Optionally mirrors to stderr for tailing while a job runs
//! - Configurable via the RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Options for [`init_logging`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Mirror log output to stderr.
    pub console: bool,

    /// Default to `debug` instead of `info` when RUST_LOG is not set.
    pub debug: bool,
}

/// Initialize the global logging subscriber.
///
/// Creates the log directory if needed, clears the previous log file and
/// installs a file layer (plus a console layer if requested).
///
/// # Errors
///
/// Returns an error if the log file cannot be prepared or a global
/// subscriber is already installed.
pub fn init_logging(log_path: &Path, options: LoggingOptions) -> Result<LoggingGuard, io::Error> {
    let (log_dir, log_file) = prepare_log_file(log_path)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE);

    // stdout carries the rendered progress and result, so logs go to stderr.
    let console_layer = options.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(true)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter(options.debug))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(io::Error::other)?;

    tracing::debug!(log_file = %log_path.display(), "Logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Env filter from RUST_LOG, defaulting to `info` (or `debug`).
fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug))
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "debug" } else { "info" })
}

/// Create the log directory and truncate the log file, returning the
/// directory and file name for the appender.
fn prepare_log_file(log_path: &Path) -> Result<(PathBuf, String), io::Error> {
    let (log_dir, log_file) = split_log_path(log_path)?;
    fs::create_dir_all(&log_dir)?;
    fs::write(log_path, "")?;
    Ok((log_dir, log_file))
}

/// Split a log file path into its directory and file name.
fn split_log_path(path: &Path) -> Result<(PathBuf, String), io::Error> {
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Log path has no file name: {}", path.display()),
            )
        })?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_log_path() {
        let (dir, file) = split_log_path(Path::new("/var/log/genflow/run.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/genflow"));
        assert_eq!(file, "run.log");

        let (dir, file) = split_log_path(Path::new("genflow.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(file, "genflow.log");
    }

    #[test]
    fn test_split_log_path_requires_file_name() {
        let err = split_log_path(Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false).to_string(), "info");
        assert_eq!(default_filter(true).to_string(), "debug");
    }

    #[test]
    fn test_guard_structure() {
        use tracing_appender::non_blocking::NonBlocking;

        let (non_blocking, guard) = NonBlocking::new(std::io::sink());
        drop(non_blocking);

        let _logging_guard = LoggingGuard { _file_guard: guard };
    }

    #[test]
    fn test_prepare_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("nested").join("genflow.log");

        let (dir, file) = prepare_log_file(&log_path).unwrap();

        assert_eq!(dir, temp_dir.path().join("logs").join("nested"));
        assert_eq!(file, "genflow.log");
        assert!(dir.is_dir());
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "");
    }

    #[test]
    fn test_prepare_clears_previous_session() {
        // The global subscriber can only be installed once per process, so
        // the file preparation that init_logging runs is tested on its own.
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("genflow.log");
        fs::write(&log_path, "old session").unwrap();

        prepare_log_file(&log_path).unwrap();

        assert_eq!(fs::read_to_string(&log_path).unwrap(), "");
    }

    #[test]
    fn test_prepare_rejects_path_without_file_name() {
        let err = prepare_log_file(Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
