//! genflow - client-side tracking of long-running content generation jobs
//!
//! Submits a job to a workflow backend, follows it over a server-push event
//! stream (falling back to polling), projects its progress onto a fixed phase
//! table and fetches the finished artifact exactly once.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use genflow::client::{HttpJobClient, RetryingClient};
//! use genflow::config::ConfigFile;
//! use genflow::push::HttpPushTransport;
//! use genflow::reconcile::{TrackerConfig, WorkflowTracker};
//! use genflow::job::JobRequest;
//!
//! let file = ConfigFile::load()?;
//! let config = TrackerConfig::from_config_file(&file);
//! let client = RetryingClient::new(HttpJobClient::new(&file.backend.url)?, config.retry.clone());
//! let transport = HttpPushTransport::new(&file.backend.url)?;
//!
//! let (tracker, handle) = WorkflowTracker::new(Arc::new(client), Arc::new(transport), config);
//! tracker.start();
//!
//! let run = handle.submit(JobRequest::new("Rust async")).await?;
//! let view = handle.settled(run).await?;
//! ```

pub mod client;
pub mod config;
pub mod job;
pub mod logging;
pub mod phase;
pub mod poll;
pub mod push;
pub mod reconcile;

/// Version of the genflow library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
