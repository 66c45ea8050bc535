//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::defaults::clamp_worker_threads;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("root_folder") {
            let v = v.trim();
            if !v.is_empty() {
                config.server.root_folder = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("exit_timeout") {
            config.server.exit_timeout = v.trim().parse().map_err(|_| {
                invalid("server", "exit_timeout", v, "must be a non-negative integer (seconds)")
            })?;
        }
    }

    // [workers] section
    if let Some(section) = ini.section(Some("workers")) {
        if let Some(v) = section.get("threads") {
            let threads: usize = v
                .trim()
                .parse()
                .map_err(|_| invalid("workers", "threads", v, "must be a positive integer"))?;
            config.workers.threads = clamp_worker_threads(threads);
        }
        if let Some(v) = section.get("reduction_threads") {
            config.workers.reduction_threads = v.trim().parse().map_err(|_| {
                invalid(
                    "workers",
                    "reduction_threads",
                    v,
                    "must be a non-negative integer (0 = one per CPU)",
                )
            })?;
        }
    }

    // [animation] section
    if let Some(section) = ini.section(Some("animation")) {
        if let Some(v) = section.get("flow_window") {
            let window: u32 = v
                .trim()
                .parse()
                .map_err(|_| invalid("animation", "flow_window", v, "must be a positive integer"))?;
            if window == 0 {
                return Err(invalid("animation", "flow_window", v, "must be at least 1"));
            }
            config.animation.flow_window = window;
        }
        if let Some(v) = section.get("flow_timeout") {
            config.animation.flow_timeout = v.trim().parse().map_err(|_| {
                invalid(
                    "animation",
                    "flow_timeout",
                    v,
                    "must be a non-negative integer (seconds)",
                )
            })?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = section.get("verbose") {
            config.logging.verbose = parse_bool(v);
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a boolean value from string.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
