//! Tooling & Integration Layer
//!
//! Command-line front end over the record loader.

pub mod cli;

pub use cli::{Cli, CliContext, OutputFormat};
