//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[backend]
; Base URL of the workflow API. Jobs are submitted to <url>/workflows.
url = {}
; Follow job progress over server-sent events, falling back to polling
; when the event stream keeps failing (default: true)
push_enabled = {}

[client]
; Timeout for a single request in milliseconds (default: 30000)
request_timeout_ms = {}
; Retries for transient failures (network errors, timeouts, 5xx) (default: 3)
max_retries = {}
; Delay before the first retry in milliseconds, doubled per retry (default: 500)
retry_base_delay_ms = {}

[push]
; Consecutive event stream failures before switching to polling (default: 5)
max_reconnect_attempts = {}
; Delay before the first reconnect in milliseconds, doubled per failure (default: 1000)
reconnect_base_delay_ms = {}

[polling]
; Status poll interval in milliseconds (default: 2000)
interval_ms = {}

[logging]
; Log file location (default: ~/.genflow/genflow.log)
file = {}
"#,
        config.backend.url,
        config.backend.push_enabled,
        config.client.request_timeout_ms,
        config.client.max_retries,
        config.client.retry_base_delay_ms,
        config.push.max_reconnect_attempts,
        config.push.reconnect_base_delay_ms,
        config.polling.interval_ms,
        path_to_string(&config.logging.file),
    )
}

/// Convert path to string, collapsing home dir to ~.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
