//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::WavMetaConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a root directory from files and environment.
    pub fn load(root: &Path) -> Result<WavMetaConfig, ConfigError> {
        MergeService::load(root)
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<WavMetaConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    pub fn default() -> WavMetaConfig {
        WavMetaConfig::default()
    }
}
