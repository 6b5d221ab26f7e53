pub mod doctor;
pub mod onboard;
pub mod scan;

use scanpilot_config::{AppConfig, ConfigError};
use std::path::{Path, PathBuf};

/// Where the config lives: the `--config` override or the default path.
pub fn config_path(override_path: Option<&Path>) -> PathBuf {
    override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(override_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::load_with_env(&config_path(override_path))
}
