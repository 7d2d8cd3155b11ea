//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization, runtime creation and
//! backend construction so command handlers stay small.

use std::future::Future;
use std::path::PathBuf;

use genflow::client::{
    HttpJobClient, JobClient, JobClientError, RetryingClient, SimulatedJobClient,
};
use genflow::config::{config_file_path, ConfigFile};
use genflow::job::{JobArtifact, JobId, JobRequest, StatusSnapshot, SubmitReceipt};
use genflow::logging::{init_logging, LoggingGuard, LoggingOptions};
use genflow::push::HttpPushTransport;
use genflow::reconcile::TrackerConfig;
use tracing::info;

use crate::error::CliError;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub mock: bool,
    pub debug: bool,
}

/// The job backend selected on the command line.
pub enum Backend {
    Http(RetryingClient<HttpJobClient>),
    Simulated(SimulatedJobClient),
}

impl Backend {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Backend::Simulated(_))
    }

    /// Make `job_id` known to the simulated backend so it can be followed.
    /// No effect on the HTTP backend.
    pub fn register_job(&self, job_id: &JobId) {
        if let Backend::Simulated(client) = self {
            client.insert_job(job_id.clone(), JobRequest::new(job_id.as_str()));
        }
    }
}

impl JobClient for Backend {
    async fn submit(&self, request: &JobRequest) -> Result<SubmitReceipt, JobClientError> {
        match self {
            Backend::Http(client) => client.submit(request).await,
            Backend::Simulated(client) => client.submit(request).await,
        }
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot, JobClientError> {
        match self {
            Backend::Http(client) => client.fetch_status(job_id).await,
            Backend::Simulated(client) => client.fetch_status(job_id).await,
        }
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<JobArtifact, JobClientError> {
        match self {
            Backend::Http(client) => client.fetch_result(job_id).await,
            Backend::Simulated(client) => client.fetch_result(job_id).await,
        }
    }
}

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
    mock: bool,
}

impl CliRunner {
    /// Load the config file and initialize logging.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let config_path = options.config.clone().unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let logging_guard = init_logging(
            &config.logging.file,
            LoggingOptions {
                console: options.debug,
                debug: options.debug,
            },
        )
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            config_path,
            mock: options.mock,
        })
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!(version = genflow::VERSION, command, "genflow CLI starting");
        info!(
            config = %self.config_path.display(),
            backend = %self.config.backend.url,
            mock = self.mock,
            "Configuration loaded"
        );
    }

    /// Tracker configuration; mock mode always polls.
    pub fn tracker_config(&self, no_push: bool) -> TrackerConfig {
        let config = TrackerConfig::from_config_file(&self.config);
        let push_enabled = config.push_enabled && !no_push && !self.mock;
        config.with_push_enabled(push_enabled)
    }

    /// Build the job backend: simulated with `--mock`, HTTP otherwise.
    pub fn backend(&self) -> Result<Backend, CliError> {
        if self.mock {
            info!("Using simulated backend");
            return Ok(Backend::Simulated(SimulatedJobClient::new()));
        }
        let client = HttpJobClient::new(&self.config.backend.url)?;
        let policy = TrackerConfig::from_config_file(&self.config).retry;
        Ok(Backend::Http(RetryingClient::new(client, policy)))
    }

    /// Build the push transport for the configured backend.
    pub fn push_transport(&self) -> Result<HttpPushTransport, CliError> {
        Ok(HttpPushTransport::new(&self.config.backend.url)?)
    }

    /// Run a future to completion on a current-thread runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, CliError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;
        Ok(runtime.block_on(future))
    }
}
