//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use imgstream::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective settings (file values over defaults)
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand against `path` (or the default location).
pub fn run(command: ConfigCommands, path: Option<PathBuf>) -> Result<(), CliError> {
    let path = path.unwrap_or_else(config_file_path);
    match command {
        ConfigCommands::Path => run_path(&path),
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Init { force } => run_init(&path, force),
    }
}

fn run_path(path: &Path) -> Result<(), CliError> {
    println!("{}", path.display());
    Ok(())
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;

    println!("Configuration Settings");
    println!("======================");
    if !path.exists() {
        println!("(no file at {}, showing defaults)", path.display());
    }
    println!();
    for line in render(&config) {
        println!("{}", line);
    }
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "'{}' already exists. Use --force to overwrite it.",
            path.display()
        )));
    }

    ConfigFile::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Format settings as `[section]` headers followed by `key = value` lines.
fn render(config: &ConfigFile) -> Vec<String> {
    let exit_timeout = match config.server.exit_timeout {
        0 => "0 (never)".to_string(),
        secs => format!("{}s", secs),
    };
    let reduction_threads = match config.workers.reduction_threads {
        0 => "0 (one per CPU)".to_string(),
        n => n.to_string(),
    };
    let flow_timeout = match config.animation.flow_timeout {
        0 => "0 (wait forever)".to_string(),
        secs => format!("{}s", secs),
    };

    vec![
        "[server]".to_string(),
        format!("  root_folder = {}", config.server.root_folder.display()),
        format!("  exit_timeout = {}", exit_timeout),
        String::new(),
        "[workers]".to_string(),
        format!("  threads = {}", config.workers.threads),
        format!("  reduction_threads = {}", reduction_threads),
        String::new(),
        "[animation]".to_string(),
        format!("  flow_window = {}", config.animation.flow_window),
        format!("  flow_timeout = {}", flow_timeout),
        String::new(),
        "[logging]".to_string(),
        format!("  directory = {}", config.logging.directory.display()),
        format!("  file = {}", config.logging.file),
        format!("  verbose = {}", config.logging.verbose),
    ]
}
