//! User configuration stored in `~/.genflow/config.ini`.
//!
//! Settings structs live in [`settings`], constants in [`defaults`],
//! parsing in `parser`, and serialization in `writer`. Loading a file that
//! does not exist yields the defaults.
//!
//! # Example
//!
//! ```ignore
//! use genflow::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! println!("backend: {}", config.backend.url);
//! ```

pub mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    BackendSettings, ClientSettings, ConfigFile, LoggingSettings, PollingSettings, PushSettings,
};
