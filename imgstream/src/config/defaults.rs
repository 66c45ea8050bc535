//! Default values and constants for all configuration settings.

use std::path::PathBuf;

use super::settings::*;

// =============================================================================
// CPU helpers
// =============================================================================

/// Get the number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Clamps the worker thread count to valid range and logs a warning if clamped.
pub fn clamp_worker_threads(value: usize) -> usize {
    if value < MIN_WORKER_THREADS {
        tracing::warn!(
            requested = value,
            min = MIN_WORKER_THREADS,
            "workers.threads below minimum, clamping to {}",
            MIN_WORKER_THREADS
        );
        MIN_WORKER_THREADS
    } else if value > MAX_WORKER_THREADS {
        tracing::warn!(
            requested = value,
            max = MAX_WORKER_THREADS,
            "workers.threads above maximum, clamping to {}",
            MAX_WORKER_THREADS
        );
        MAX_WORKER_THREADS
    } else {
        value
    }
}

// =============================================================================
// Constants
// =============================================================================

/// Minimum event-handling worker threads.
pub const MIN_WORKER_THREADS: usize = 1;

/// Maximum event-handling worker threads.
pub const MAX_WORKER_THREADS: usize = 256;

/// Default animation flow window (frames in flight).
pub const DEFAULT_FLOW_WINDOW: u32 = 5;

/// Default seconds a paused animation waits for a flow event (0 = forever).
pub const DEFAULT_FLOW_TIMEOUT_SECS: u64 = 0;

/// Default exit timeout (0 = never exit when idle).
pub const DEFAULT_EXIT_TIMEOUT_SECS: u64 = 0;

/// Default log directory.
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "imgstream.log";

// =============================================================================
// ConfigFile::default()
// =============================================================================

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                root_folder: PathBuf::from("."),
                exit_timeout: DEFAULT_EXIT_TIMEOUT_SECS,
            },
            workers: WorkerSettings {
                threads: num_cpus().clamp(MIN_WORKER_THREADS, MAX_WORKER_THREADS),
                reduction_threads: 0,
            },
            animation: AnimationConfig {
                flow_window: DEFAULT_FLOW_WINDOW,
                flow_timeout: DEFAULT_FLOW_TIMEOUT_SECS,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
                file: DEFAULT_LOG_FILE.to_string(),
                verbose: false,
            },
        }
    }
}
