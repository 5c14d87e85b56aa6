//! MergeService: orchestrates sources and deserializes to WavMetaConfig.

use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::WavMetaConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> root file -> environment (highest).
    pub fn load(root: &Path) -> Result<WavMetaConfig, ConfigError> {
        let builder = Self::base();
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, root)?;
        let builder = environment::add_to_builder(builder)?;
        builder.build()?.try_deserialize()
    }

    /// A single explicit file, then the environment.
    pub fn load_from_file(path: &Path) -> Result<WavMetaConfig, ConfigError> {
        let builder = Self::base().add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder)?;
        builder.build()?.try_deserialize()
    }

    /// Missing keys fall back to the serde defaults on `WavMetaConfig`.
    fn base() -> ConfigBuilder<DefaultState> {
        Config::builder()
    }
}
