//! Autosave: periodically save exactly the dirty records.

use super::{AgentContext, AgentCycle, PeriodicAgent};
use crate::error::AgentFailure;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub type AutoSaveAgent = PeriodicAgent<AutoSaveCycle>;

#[derive(Debug, Default)]
pub struct AutoSaveCycle;

impl AutoSaveCycle {
    /// Dirty records without an unresolved conflict. Conflicted records wait for
    /// `resolve_conflict`.
    fn candidates(ctx: &AgentContext) -> Vec<PathBuf> {
        let dirty = ctx.store.dirty_paths();
        let state = ctx.store.read();
        dirty
            .into_iter()
            .filter(|path| state.conflict(path).is_none())
            .collect()
    }
}

impl AgentCycle for AutoSaveCycle {
    fn id(&self) -> &'static str {
        "autosave"
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn run_cycle(&self, ctx: &AgentContext) -> Result<(), AgentFailure> {
        let paths = Self::candidates(ctx);
        if paths.is_empty() {
            return Ok(());
        }
        let reports = ctx.saver.save_paths(&paths);
        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        debug!(saved = reports.len() - failed, failed, "Autosave cycle finished");
        Ok(())
    }
}
