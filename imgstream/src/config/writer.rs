//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let verbose = if config.logging.verbose { "true" } else { "false" };

    format!(
        r#"; imgstream configuration
; Lines starting with ; are comments.

[server]
; Folder that file paths in open requests are resolved against
root_folder = {}
; Seconds with no connected client before the server exits (0 = never)
exit_timeout = {}

[workers]
; Event-handling worker threads (1-256)
threads = {}
; Threads for parallel reductions such as histograms (0 = one per CPU)
reduction_threads = {}

[animation]
; Frames streamed ahead of client acknowledgements
flow_window = {}
; Seconds a paused playback waits for an acknowledgement before aborting (0 = forever)
flow_timeout = {}

[logging]
directory = {}
file = {}
; Enable debug-level logging
verbose = {}
"#,
        path_to_string(&config.server.root_folder),
        config.server.exit_timeout,
        config.workers.threads,
        config.workers.reduction_threads,
        config.animation.flow_window,
        config.animation.flow_timeout,
        path_to_string(&config.logging.directory),
        config.logging.file,
        verbose,
    )
}

/// Convert path to string, collapsing home dir to ~.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::settings::ConfigFile;
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.server.root_folder = PathBuf::from("/srv/images");
        config.server.exit_timeout = 120;
        config.workers.threads = 6;
        config.animation.flow_window = 9;
        config.logging.verbose = true;

        config.save_to(&config_path).unwrap();
        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_output_has_every_section() {
        let content = to_config_string(&ConfigFile::default());
        for section in ["[server]", "[workers]", "[animation]", "[logging]"] {
            assert!(content.contains(section), "missing {}", section);
        }
    }

    #[test]
    fn test_home_collapsed_to_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path_to_string(&home.join("logs")), "~/logs");
        }
    }
}
