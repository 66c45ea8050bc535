//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// Worker pool settings
    pub workers: WorkerSettings,
    /// Animation flow control settings
    pub animation: AnimationConfig,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    /// Folder file paths in open requests are resolved against.
    pub root_folder: PathBuf,
    /// Seconds without any connected client before the server exits.
    /// 0 disables the timeout.
    pub exit_timeout: u64,
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Event-handling worker threads.
    /// Default: number of CPU cores. Clamped to 1-256.
    pub threads: usize,
    /// Threads for parallel reductions (histograms, statistics).
    /// 0 uses one thread per CPU core.
    pub reduction_threads: usize,
}

/// Animation configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationConfig {
    /// Unacknowledged frames allowed in flight when the client does not
    /// request a window. Minimum 1.
    pub flow_window: u32,
    /// Seconds a paused playback may wait for a flow event before it is
    /// aborted. 0 waits forever.
    pub flow_timeout: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory the log file is written to.
    pub directory: PathBuf,
    /// Log file name.
    pub file: String,
    /// Enable debug-level logging.
    pub verbose: bool,
}
