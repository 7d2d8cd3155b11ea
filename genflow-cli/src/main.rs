//! genflow CLI - Command-line interface
//!
//! Submits content generation jobs, follows them to completion and queries
//! their status and results.

mod commands;
mod error;
mod render;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::run::RunArgs;
use error::CliError;
use runner::{CliRunner, GlobalOptions};

#[derive(Parser)]
#[command(name = "genflow")]
#[command(version = genflow::VERSION)]
#[command(about = "Submit and follow content generation jobs", long_about = None)]
struct Cli {
    /// Path to the config file (default: ~/.genflow/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use an in-memory simulated backend instead of the configured one
    #[arg(long, global = true)]
    mock: bool,

    /// Enable debug logging and mirror logs to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and follow it until it finishes
    Run(RunArgs),

    /// Follow an existing job until it finishes
    Watch {
        /// Job identifier
        job_id: String,

        /// Poll for status instead of using the event stream
        #[arg(long)]
        no_push: bool,
    },

    /// Show the current status of a job
    Status {
        /// Job identifier
        job_id: String,
    },

    /// Print the result of a finished job
    Result {
        /// Job identifier
        job_id: String,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli) {
        e.exit();
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let options = GlobalOptions {
        config: cli.config,
        mock: cli.mock,
        debug: cli.debug,
    };

    match cli.command {
        Commands::Config(command) => commands::config::run(command, &options),
        Commands::Run(args) => commands::run::run(&CliRunner::new(&options)?, args),
        Commands::Watch { job_id, no_push } => {
            commands::run::watch(&CliRunner::new(&options)?, job_id, no_push)
        }
        Commands::Status { job_id } => commands::status::status(&CliRunner::new(&options)?, job_id),
        Commands::Result { job_id } => commands::status::result(&CliRunner::new(&options)?, job_id),
    }
}
