//! Per-root config file: `<root>/wavmeta.toml`.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::Path;

pub const FILE_NAME: &str = "wavmeta.toml";

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let dir = if root.is_file() {
        root.parent().unwrap_or(root)
    } else {
        root
    };
    Ok(builder.add_source(File::from(dir.join(FILE_NAME)).required(false)))
}
