//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};
use reqwest::Url;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [backend] section
    if let Some(section) = ini.section(Some("backend")) {
        if let Some(v) = section.get("url") {
            let v = v.trim();
            if !is_http_url(v) {
                return Err(invalid(
                    "backend",
                    "url",
                    v,
                    "must be an http:// or https:// URL",
                ));
            }
            config.backend.url = v.to_string();
        }
        if let Some(v) = section.get("push_enabled") {
            config.backend.push_enabled = parse_bool(v).ok_or_else(|| {
                invalid("backend", "push_enabled", v, "must be true or false")
            })?;
        }
    }

    // [client] section
    if let Some(section) = ini.section(Some("client")) {
        if let Some(v) = positive(section, "client", "request_timeout_ms")? {
            config.client.request_timeout_ms = v;
        }
        if let Some(v) = number::<u32>(section, "client", "max_retries", "must be a non-negative integer")? {
            config.client.max_retries = v;
        }
        if let Some(v) = positive(section, "client", "retry_base_delay_ms")? {
            config.client.retry_base_delay_ms = v;
        }
    }

    // [push] section
    if let Some(section) = ini.section(Some("push")) {
        if let Some(v) = number::<u32>(section, "push", "max_reconnect_attempts", "must be a positive integer")? {
            if v == 0 {
                return Err(invalid(
                    "push",
                    "max_reconnect_attempts",
                    "0",
                    "must be a positive integer",
                ));
            }
            config.push.max_reconnect_attempts = v;
        }
        if let Some(v) = positive(section, "push", "reconnect_base_delay_ms")? {
            config.push.reconnect_base_delay_ms = v;
        }
    }

    // [polling] section
    if let Some(section) = ini.section(Some("polling")) {
        if let Some(v) = positive(section, "polling", "interval_ms")? {
            config.polling.interval_ms = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an optional numeric key.
fn number<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    section
        .get(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| invalid(section_name, key, v, reason))
        })
        .transpose()
}

/// Parse an optional millisecond value that must be greater than zero.
fn positive(section: &Properties, section_name: &str, key: &str) -> Result<Option<u64>, ConfigFileError> {
    const REASON: &str = "must be a positive integer (milliseconds)";
    match number::<u64>(section, section_name, key, REASON)? {
        Some(0) => Err(invalid(section_name, key, "0", REASON)),
        other => Ok(other),
    }
}

/// Parse a boolean; `None` if the value is not recognised.
pub(super) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
