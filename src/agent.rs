//! Background agents
//!
//! Every agent is a [`PeriodicAgent`] wrapping one [`AgentCycle`]: autosave, file
//! watcher and validation. They share the store and the save pipeline through an
//! [`AgentContext`] and report state changes on the event bus. An agent that fails
//! stops itself; its siblings keep running.

pub mod autosave;
pub mod runtime;
pub mod validation;
pub mod watcher;

pub use autosave::{AutoSaveAgent, AutoSaveCycle};
pub use runtime::PeriodicAgent;
pub use validation::{ValidationAgent, ValidationCycle};
pub use watcher::{FileWatcherAgent, WatcherCycle};

use crate::config::WavMetaConfig;
use crate::error::AgentFailure;
use crate::events::EventBus;
use crate::save::SavePipeline;
use crate::store::Store;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Running,
    Stopped,
    Failed(String),
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Idle => f.write_str("idle"),
            AgentState::Running => f.write_str("running"),
            AgentState::Stopped => f.write_str("stopped"),
            AgentState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Lifecycle shared by all agents.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &'static str;

    fn default_interval(&self) -> Duration;

    /// Spawn the agent's task on the current tokio runtime. Starting a running
    /// agent is a no-op.
    fn start(&self, interval: Duration) -> Result<(), AgentFailure>;

    /// Ask the agent to stop and wait for its task. A cycle already in progress
    /// runs to completion first.
    async fn stop(&self);

    fn status(&self) -> AgentState;
}

/// Shared handles every cycle works through.
#[derive(Clone)]
pub struct AgentContext {
    pub store: Arc<Store>,
    pub saver: Arc<SavePipeline>,
    pub events: EventBus,
    pub config: Arc<WavMetaConfig>,
}

/// One unit of periodic work. `run_cycle` runs on a blocking thread.
pub trait AgentCycle: Send + Sync + 'static {
    fn id(&self) -> &'static str;

    fn default_interval(&self) -> Duration;

    /// Called once before the first cycle. `wake` runs the next cycle early.
    fn on_start(&self, _ctx: &AgentContext, _wake: Arc<Notify>) -> Result<(), AgentFailure> {
        Ok(())
    }

    fn on_stop(&self) {}

    fn run_cycle(&self, ctx: &AgentContext) -> Result<(), AgentFailure>;
}
