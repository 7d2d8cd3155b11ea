//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub backend: BackendSettings,
    pub client: ClientSettings,
    pub push: PushSettings,
    pub polling: PollingSettings,
    pub logging: LoggingSettings,
}

/// `[backend]` - where jobs are submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Base URL of the workflow API.
    pub url: String,
    /// Follow jobs over the event stream before falling back to polling.
    pub push_enabled: bool,
}

/// `[client]` - request timeout and retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// `[push]` - event stream reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    /// Consecutive failures before falling back to polling.
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
}

/// `[polling]` - status polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingSettings {
    pub interval_ms: u64,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file path.
    pub file: PathBuf,
}
