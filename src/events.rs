//! Coordinator events
//!
//! Collaborators (a UI, a CLI, tests) observe the core only through these events.
//! The bus is a `tokio::sync::broadcast` channel: publishing never blocks, slow
//! subscribers see `Lagged` instead of stalling producers.

use crate::agent::AgentState;
use crate::error::ErrorKind;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

/// How a file with unsaved edits diverged from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    ModifiedExternally,
    Removed,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::ModifiedExternally => f.write_str("modified externally"),
            ConflictKind::Removed => f.write_str("removed"),
        }
    }
}

/// Structured description of one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// File the failure concerns; `None` for agent-level faults.
    pub path: Option<PathBuf>,
    pub kind: ErrorKind,
    pub detail: String,
}

/// Per-file result of a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    Unchanged,
    Failed { kind: ErrorKind, detail: String },
}

impl SaveOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SaveOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    LoadProgress {
        done: usize,
        total: usize,
    },
    LoadComplete {
        successes: usize,
        failures: Vec<FailureReport>,
    },
    /// Fields, dirty flag, path or validity of a record changed.
    RecordChanged {
        path: PathBuf,
    },
    AgentStatusChanged {
        agent: &'static str,
        state: AgentState,
    },
    ConflictDetected {
        path: PathBuf,
        kind: ConflictKind,
    },
    SaveComplete {
        path: PathBuf,
        outcome: SaveOutcome,
    },
    ValidationReported {
        path: PathBuf,
        valid: bool,
        issues: Vec<String>,
    },
    Failure(FailureReport),
}

impl CoordinatorEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CoordinatorEvent::LoadProgress { .. } => "LoadProgress",
            CoordinatorEvent::LoadComplete { .. } => "LoadComplete",
            CoordinatorEvent::RecordChanged { .. } => "RecordChanged",
            CoordinatorEvent::AgentStatusChanged { .. } => "AgentStatusChanged",
            CoordinatorEvent::ConflictDetected { .. } => "ConflictDetected",
            CoordinatorEvent::SaveComplete { .. } => "SaveComplete",
            CoordinatorEvent::ValidationReported { .. } => "ValidationReported",
            CoordinatorEvent::Failure(_) => "Failure",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn emit(&self, event: CoordinatorEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).is_err() {
            trace!(event_type, "No subscribers for event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(CoordinatorEvent::LoadProgress { done: 1, total: 2 });
        bus.emit(CoordinatorEvent::LoadProgress { done: 2, total: 2 });
        assert_eq!(rx.recv().await.unwrap(), CoordinatorEvent::LoadProgress { done: 1, total: 2 });
        assert_eq!(rx.recv().await.unwrap(), CoordinatorEvent::LoadProgress { done: 2, total: 2 });
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.emit(CoordinatorEvent::RecordChanged {
            path: PathBuf::from("/a.wav"),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = CoordinatorEvent::SaveComplete {
            path: PathBuf::from("/a.wav"),
            outcome: SaveOutcome::Failed {
                kind: ErrorKind::Conflict,
                detail: "changed on disk".to_string(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SaveComplete");
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["kind"], "conflict");
    }
}
