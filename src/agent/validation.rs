//! Validation agent: re-derive validity and publish it when it changes.

use super::{AgentContext, AgentCycle, PeriodicAgent};
use crate::error::AgentFailure;
use crate::events::CoordinatorEvent;
use crate::record::MetadataFields;
use crate::store::StoreState;
use crate::validation::{validate_record, ValidationReport};
use std::time::Duration;
use tracing::debug;

pub type ValidationAgent = PeriodicAgent<ValidationCycle>;

#[derive(Debug, Default)]
pub struct ValidationCycle;

impl AgentCycle for ValidationCycle {
    fn id(&self) -> &'static str {
        "validation"
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn run_cycle(&self, ctx: &AgentContext) -> Result<(), AgentFailure> {
        for path in ctx.store.paths() {
            let (report, validated) = {
                let state = ctx.store.read();
                match state.record(&path) {
                    Some(record) => (
                        validate_record(record, &ctx.config.validation),
                        record.fields().clone(),
                    ),
                    None => continue,
                }
            };
            let valid = report.is_valid();
            let issues = report.issues();

            let Some(changed) = publish(&mut ctx.store.write(), report, &validated) else {
                debug!(path = %path.display(), "Record edited during validation, left for next cycle");
                continue;
            };
            if changed {
                ctx.events
                    .emit(CoordinatorEvent::ValidationReported { path, valid, issues });
            }
        }
        Ok(())
    }
}

/// Store `report` if the record still holds the fields it was computed from.
/// `Some(true)` when the stored verdict changed, `None` when the report is stale.
fn publish(state: &mut StoreState, report: ValidationReport, validated: &MetadataFields) -> Option<bool> {
    if state.record(&report.path)?.fields() != validated {
        return None;
    }
    let changed = state
        .validity(&report.path)
        .map(|previous| previous.is_valid() != report.is_valid() || previous.issues() != report.issues())
        .unwrap_or(true);
    state.set_validity(report);
    Some(changed)
}
