//! Default paths for shared enrolment components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/shared-enrol/config.toml` or `~/.config/shared-enrol/config.toml`
//! - Data: `$XDG_DATA_HOME/shared-enrol` or `~/.local/share/shared-enrol`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const SHARED_ENROL_CONFIG_ENV: &str = "SHARED_ENROL_CONFIG";

/// Environment variable for overriding the data directory
pub const SHARED_ENROL_DATA_DIR_ENV: &str = "SHARED_ENROL_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "shared-enrol";

/// Database filename within the data directory
pub const DB_FILENAME: &str = "shared-enrol.db";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$SHARED_ENROL_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/shared-enrol/config.toml`
/// 3. `~/.config/shared-enrol/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(SHARED_ENROL_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(APP_DIR).join("config.toml")
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$SHARED_ENROL_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/shared-enrol`
/// 3. `~/.local/share/shared-enrol`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(SHARED_ENROL_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the env override.
/// Used for default values in configs where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_contains_app_dir() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("shared-enrol"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }
}
