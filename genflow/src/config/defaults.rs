//! Default values for all configuration settings.

use super::settings::*;

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000/api";

pub const DEFAULT_PUSH_ENABLED: bool = true;

/// Default per-request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default number of retries for transient client errors.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Default consecutive push failures before falling back to polling.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Default status poll interval (2 seconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default log file name inside the config directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "genflow.log";

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = super::file::config_directory();

        Self {
            backend: BackendSettings {
                url: DEFAULT_BACKEND_URL.to_string(),
                push_enabled: DEFAULT_PUSH_ENABLED,
            },
            client: ClientSettings {
                request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            },
            push: PushSettings {
                max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
                reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            },
            polling: PollingSettings {
                interval_ms: DEFAULT_POLL_INTERVAL_MS,
            },
            logging: LoggingSettings {
                file: config_dir.join(DEFAULT_LOG_FILE_NAME),
            },
        }
    }
}
