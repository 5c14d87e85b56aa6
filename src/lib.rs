//! wavmeta: Concurrent WAV Metadata Store
//!
//! Reads and writes the iXML, bext and LIST/INFO metadata of production-sound WAV
//! files. Loaded files become [`record::MetadataRecord`]s in a shared [`store::Store`];
//! edits are undoable [`command::Command`]s; background agents autosave, watch for
//! external changes and validate; saves are atomic and verified. Everything is driven
//! through the [`coordinator::Coordinator`].

pub mod agent;
pub mod codec;
pub mod command;
pub mod concurrency;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod load;
pub mod logging;
pub mod mirror;
pub mod record;
pub mod save;
pub mod store;
pub mod tooling;
pub mod types;
pub mod validation;

pub use coordinator::{Coordinator, Resolution};
pub use error::ApiError;
pub use events::CoordinatorEvent;
