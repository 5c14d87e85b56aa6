//! Configuration
//!
//! `WavMetaConfig` is assembled by [`ConfigLoader`] from, lowest precedence first:
//! serde defaults, the global `config.toml` in the platform config directory,
//! `<root>/wavmeta.toml`, and `WAVMETA_*` environment variables (`__` between
//! nested keys, e.g. `WAVMETA_AUTOSAVE__INTERVAL_MS=5000`).

pub mod facade;
pub mod merge;
pub mod sources;

pub use facade::ConfigLoader;

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WavMetaConfig {
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_autosave_interval_ms")]
    pub interval_ms: u64,
}

fn default_autosave_interval_ms() -> u64 {
    30_000
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_autosave_interval_ms(),
        }
    }
}

impl AutoSaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Poll interval.
    #[serde(default = "default_watcher_interval_ms")]
    pub interval_ms: u64,
    /// Also wake on filesystem notifications between polls.
    #[serde(default = "default_true")]
    pub use_notify: bool,
}

fn default_watcher_interval_ms() -> u64 {
    2_000
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_watcher_interval_ms(),
            use_notify: true,
        }
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_validation_interval_ms")]
    pub interval_ms: u64,
    /// Refuse to save records that fail validation.
    #[serde(default)]
    pub block_save_on_invalid: bool,
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
}

fn default_validation_interval_ms() -> u64 {
    60_000
}

fn default_required_fields() -> Vec<String> {
    vec!["Scene".to_string(), "Take".to_string()]
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_validation_interval_ms(),
            block_save_on_invalid: false,
            required_fields: default_required_fields(),
        }
    }
}

impl ValidationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    crate::command::history::DEFAULT_MAX_DEPTH
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_workers_per_cpu")]
    pub workers_per_cpu: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Start the agents once a load produced at least one record.
    #[serde(default = "default_true")]
    pub start_agents: bool,
}

fn default_workers_per_cpu() -> usize {
    2
}

fn default_max_workers() -> usize {
    16
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            workers_per_cpu: default_workers_per_cpu(),
            max_workers: default_max_workers(),
            start_agents: true,
        }
    }
}

impl LoadConfig {
    /// `workers_per_cpu × available_parallelism`, capped at `max_workers`, at least 1.
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.saturating_mul(self.workers_per_cpu)
            .min(self.max_workers)
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}
