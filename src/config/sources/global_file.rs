//! Global config file: `config.toml` in the platform config directory
//! (`$XDG_CONFIG_HOME/wavmeta/` on Linux).

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::PathBuf;

pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "wavmeta").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Add the global file if the platform has a config directory. The file is optional.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(match global_config_path() {
        Some(path) => builder.add_source(File::from(path).required(false)),
        None => builder,
    })
}
