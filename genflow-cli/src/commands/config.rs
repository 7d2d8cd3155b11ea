//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use clap::Subcommand;
use genflow::config::ConfigFile;

use crate::error::CliError;
use crate::runner::GlobalOptions;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration (defaults merged with the file)
    Show,

    /// Write a default configuration file if none exists
    Init,
}

/// Run a config subcommand.
///
/// These commands do not initialize logging, so they work even when the
/// configured log file is not writable.
pub fn run(command: ConfigCommands, options: &GlobalOptions) -> Result<(), CliError> {
    let path = options
        .config
        .clone()
        .unwrap_or_else(genflow::config::config_file_path);

    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
        }
        ConfigCommands::Show => {
            let config = ConfigFile::load_from(&path)?;
            if !path.exists() {
                println!("# {} does not exist; showing defaults", path.display());
            }
            print!("{}", config.to_ini_string());
        }
        ConfigCommands::Init => {
            if ConfigFile::ensure_exists_at(&path)? {
                println!("Created {}", path.display());
            } else {
                println!("{} already exists; left unchanged", path.display());
            }
        }
    }
    Ok(())
}
