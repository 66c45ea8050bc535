//! Configuration for the imgstream server.
//!
//! Configuration lives in an INI file at `~/.imgstream/config.ini`:
//!
//! ```ini
//! [server]
//! root_folder = ~/images
//! exit_timeout = 0
//!
//! [workers]
//! threads = 8
//! reduction_threads = 0
//!
//! [animation]
//! flow_window = 5
//! flow_timeout = 0
//!
//! [logging]
//! directory = logs
//! file = imgstream.log
//! verbose = false
//! ```
//!
//! Missing keys keep their defaults; invalid values are rejected with
//! [`ConfigFileError::InvalidValue`].

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    clamp_worker_threads, num_cpus, DEFAULT_EXIT_TIMEOUT_SECS, DEFAULT_FLOW_TIMEOUT_SECS, DEFAULT_FLOW_WINDOW,
    DEFAULT_LOG_DIRECTORY, DEFAULT_LOG_FILE, MAX_WORKER_THREADS, MIN_WORKER_THREADS,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{AnimationConfig, ConfigFile, LoggingSettings, ServerSettings, WorkerSettings};
