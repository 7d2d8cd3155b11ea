//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`run`] - Submit a job and follow it (`run`), or follow an existing job (`watch`)
//! - [`status`] - One-shot status and result queries

pub mod config;
pub mod run;
pub mod status;
