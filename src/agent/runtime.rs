//! Periodic agent runtime: sleep or wake, run one cycle on a blocking thread, repeat.

use super::{Agent, AgentContext, AgentCycle, AgentState};
use crate::error::{AgentFailure, ErrorKind};
use crate::events::{CoordinatorEvent, FailureReport};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct PeriodicAgent<C: AgentCycle> {
    cycle: Arc<C>,
    ctx: AgentContext,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    state: Arc<RwLock<AgentState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: AgentCycle> PeriodicAgent<C> {
    pub fn new(cycle: C, ctx: AgentContext) -> Self {
        Self {
            cycle: Arc::new(cycle),
            ctx,
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            state: Arc::new(RwLock::new(AgentState::Idle)),
            task: Mutex::new(None),
        }
    }

    pub fn cycle(&self) -> &C {
        &self.cycle
    }

    /// Run the next cycle now instead of at the end of the interval.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    fn set_state(&self, state: AgentState) {
        set_state(&self.state, &self.ctx, self.cycle.id(), state);
    }
}

fn set_state(slot: &RwLock<AgentState>, ctx: &AgentContext, agent: &'static str, state: AgentState) {
    {
        let mut current = slot.write();
        if *current == state {
            return;
        }
        *current = state.clone();
    }
    debug!(agent, state = %state, "Agent state changed");
    ctx.events.emit(CoordinatorEvent::AgentStatusChanged { agent, state });
}

fn report_failure(slot: &RwLock<AgentState>, ctx: &AgentContext, failure: &AgentFailure) {
    error!(agent = failure.agent, reason = %failure.reason, "Agent failed");
    set_state(slot, ctx, failure.agent, AgentState::Failed(failure.reason.clone()));
    ctx.events.emit(CoordinatorEvent::Failure(FailureReport {
        path: None,
        kind: ErrorKind::Agent,
        detail: failure.to_string(),
    }));
}

#[async_trait]
impl<C: AgentCycle> Agent for PeriodicAgent<C> {
    fn id(&self) -> &'static str {
        self.cycle.id()
    }

    fn default_interval(&self) -> Duration {
        self.cycle.default_interval()
    }

    fn start(&self, interval: Duration) -> Result<(), AgentFailure> {
        let id = self.cycle.id();
        let mut task = self.task.lock();
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AgentFailure::new(id, format!("no tokio runtime: {e}")))?;

        if let Err(failure) = self.cycle.on_start(&self.ctx, self.wake.clone()) {
            report_failure(&self.state, &self.ctx, &failure);
            return Err(failure);
        }

        self.running.store(true, Ordering::SeqCst);
        self.set_state(AgentState::Running);
        info!(agent = id, interval_ms = interval.as_millis() as u64, "Agent started");

        let cycle = self.cycle.clone();
        let ctx = self.ctx.clone();
        let running = self.running.clone();
        let wake = self.wake.clone();
        let state = self.state.clone();
        *task = Some(runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = wake.notified() => {}
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let worker = {
                    let cycle = cycle.clone();
                    let ctx = ctx.clone();
                    tokio::task::spawn_blocking(move || cycle.run_cycle(&ctx))
                };
                let failure = match worker.await {
                    Ok(Ok(())) => continue,
                    Ok(Err(failure)) => failure,
                    Err(join) => AgentFailure::new(cycle.id(), format!("cycle panicked: {join}")),
                };
                running.store(false, Ordering::SeqCst);
                report_failure(&state, &ctx, &failure);
                break;
            }
        }));
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(agent = self.cycle.id(), error = %err, "Agent task ended abnormally");
            }
        }
        self.cycle.on_stop();
        if !matches!(self.status(), AgentState::Failed(_) | AgentState::Idle) {
            self.set_state(AgentState::Stopped);
            info!(agent = self.cycle.id(), "Agent stopped");
        }
    }

    fn status(&self) -> AgentState {
        self.state.read().clone()
    }
}
