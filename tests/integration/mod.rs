//! Integration tests for the wavmeta coordinator, pipelines and agents

mod agents;
mod commands;
mod load_pipeline;
mod save_pipeline;
mod scenario;
mod support;
