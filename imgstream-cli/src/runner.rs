//! CLI runner for common setup.
//!
//! Encapsulates config loading, logging initialization and the panic hook so
//! command handlers start from a ready environment.

use std::path::{Path, PathBuf};

use tracing::info;

use imgstream::config::{config_file_path, ConfigFile};
use imgstream::logging::{init_logging, LoggingGuard};

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Keeps logging active while the runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Load configuration (defaults if the file is missing), initialize
    /// logging and install the panic hook.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Config file to load instead of ~/.imgstream/config.ini
    /// * `verbose` - Enable debug-level logging regardless of the config file
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let logging_guard = init_logging(
            &config.logging.directory,
            &config.logging.file,
            true,
            verbose || config.logging.verbose,
        )
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        imgstream::panic::init();

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            config_path,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("imgstream v{}", imgstream::VERSION);
        info!(
            config = %self.config_path.display(),
            "imgstream CLI: {} command",
            command
        );
    }
}
