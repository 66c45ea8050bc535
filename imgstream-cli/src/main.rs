//! imgstream CLI - Command-line interface
//!
//! Exercises the imgstream server core: `replay` runs a scripted client
//! session through the worker pool and sessions, `config` manages the
//! configuration file.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::replay::ReplayArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "imgstream")]
#[command(version = imgstream::VERSION)]
#[command(about = "Concurrent request scheduling for an image streaming server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a script of client events against the server core
    Replay(ReplayArgs),

    /// Manage the configuration file
    Config {
        /// Config file to use instead of ~/.imgstream/config.ini
        #[arg(long, global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Replay(args) => commands::replay::run(args),
        Commands::Config { config, command } => commands::config::run(command, config),
    };

    if let Err(e) = result {
        e.exit();
    }
}
