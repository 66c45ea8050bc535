//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use imgstream::config::ConfigFileError;
use imgstream::pool::PoolError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Configuration file could not be read, parsed or written
    ConfigFile(ConfigFileError),
    /// Replay script could not be read
    ScriptRead { path: PathBuf, error: std::io::Error },
    /// Replay script line could not be parsed
    Script { line: usize, message: String },
    /// Worker pool could not be started
    Pool(PoolError),
    /// Reduction thread pool could not be built
    Reducer(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Script { .. } => {
                eprintln!();
                eprintln!("Each script line is one JSON event, for example:");
                eprintln!(r#"  {{"event":"connect","client":"a"}}"#);
                eprintln!(
                    r#"  {{"event":"request","client":"a","request":{{"type":"open_file","file_id":0,"path":"cube.fits"}}}}"#
                );
                eprintln!(r#"  {{"event":"sleep","ms":100}}"#);
                eprintln!(r#"  {{"event":"disconnect","client":"a"}}"#);
            }
            CliError::ConfigFile(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in the config file, or regenerate it with:");
                eprintln!("  imgstream config init --force");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::ScriptRead { path, error } => {
                write!(f, "Failed to read script '{}': {}", path.display(), error)
            }
            CliError::Script { line, message } => {
                write!(f, "Invalid script event on line {}: {}", line, message)
            }
            CliError::Pool(e) => write!(f, "Failed to start worker pool: {}", e),
            CliError::Reducer(msg) => write!(f, "Failed to start reduction threads: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::ScriptRead { error, .. } => Some(error),
            CliError::Pool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<PoolError> for CliError {
    fn from(e: PoolError) -> Self {
        CliError::Pool(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = CliError::Script {
            line: 4,
            message: "unknown variant `jump`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid script event on line 4: unknown variant `jump`"
        );
    }

    #[test]
    fn test_pool_error_source() {
        let err = CliError::from(PoolError::NoWorkers);
        assert!(std::error::Error::source(&err).is_some());
    }
}
