//! File watcher: notice files changed or removed behind our back.
//!
//! Polls each record's mtime against the last one loaded or written. A clean
//! record is reloaded; a dirty one is flagged as a conflict, once, and left alone.
//! With `watcher.use_notify` a filesystem notification runs the next poll early.

use super::{AgentContext, AgentCycle, PeriodicAgent};
use crate::error::AgentFailure;
use crate::events::{ConflictKind, CoordinatorEvent, FailureReport};
use crate::record::MetadataRecord;
use crate::store::Store;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub type FileWatcherAgent = PeriodicAgent<WatcherCycle>;

#[derive(Default)]
pub struct WatcherCycle {
    notifier: Mutex<Option<RecommendedWatcher>>,
    watched_dirs: Mutex<HashSet<PathBuf>>,
    /// mtime at which a reload last failed; retried only once the file changes again.
    failed_reloads: Mutex<HashMap<PathBuf, SystemTime>>,
}

/// What one poll of one record decided.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observation {
    Unchanged,
    Reappeared,
    Changed(SystemTime),
    Vanished,
}

fn observe(path: &Path, last_known: Option<SystemTime>) -> Observation {
    let Some(last_known) = last_known else {
        return Observation::Unchanged;
    };
    match std::fs::metadata(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Observation::Vanished,
        Err(_) => Observation::Unchanged,
        Ok(meta) => match meta.modified() {
            Ok(modified) if modified != last_known => Observation::Changed(modified),
            Ok(_) => Observation::Reappeared,
            Err(_) => Observation::Unchanged,
        },
    }
}

impl WatcherCycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn watch_parents(&self, store: &Store) {
        let mut notifier = self.notifier.lock();
        let Some(notifier) = notifier.as_mut() else {
            return;
        };
        let mut watched = self.watched_dirs.lock();
        for path in store.paths() {
            let Some(dir) = path.parent().map(Path::to_path_buf) else {
                continue;
            };
            if watched.contains(&dir) {
                continue;
            }
            match notifier.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    debug!(dir = %dir.display(), "Watching directory");
                    watched.insert(dir);
                }
                Err(err) => warn!(dir = %dir.display(), error = %err, "Failed to watch directory"),
            }
        }
    }

    fn raise_conflict(&self, ctx: &AgentContext, path: &Path, kind: ConflictKind) {
        {
            let mut state = ctx.store.write();
            if state.record(path).is_none() || state.conflict(path) == Some(kind) {
                return;
            }
            state.set_conflict(path, kind);
        }
        warn!(path = %path.display(), kind = %kind, "Conflict detected");
        ctx.events.emit(CoordinatorEvent::ConflictDetected {
            path: path.to_path_buf(),
            kind,
        });
    }

    fn reload(&self, ctx: &AgentContext, path: &Path, modified: SystemTime) {
        if self.failed_reloads.lock().get(path) == Some(&modified) {
            return;
        }
        match MetadataRecord::load(path) {
            Ok(record) => {
                self.failed_reloads.lock().remove(path);
                ctx.store.write().replace_record(record);
                info!(path = %path.display(), "Reloaded externally modified file");
                ctx.events.emit(CoordinatorEvent::RecordChanged {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => {
                self.failed_reloads.lock().insert(path.to_path_buf(), modified);
                warn!(path = %path.display(), error = %err, "Reload failed");
                ctx.events.emit(CoordinatorEvent::Failure(FailureReport {
                    path: Some(path.to_path_buf()),
                    kind: err.kind(),
                    detail: err.to_string(),
                }));
            }
        }
    }

    fn poll(&self, ctx: &AgentContext, path: &Path) {
        let section = ctx.store.sections().get_lock(path);
        let _section = section.write();

        let (dirty, last_known, conflict) = {
            let state = ctx.store.read();
            match state.record(path) {
                Some(record) => (record.is_dirty(), record.last_known_modified(), state.conflict(path)),
                None => return,
            }
        };

        match observe(path, last_known) {
            Observation::Unchanged => {}
            Observation::Reappeared => {
                if conflict == Some(ConflictKind::Removed) {
                    ctx.store.write().clear_conflict(path);
                    ctx.events.emit(CoordinatorEvent::RecordChanged {
                        path: path.to_path_buf(),
                    });
                }
            }
            Observation::Vanished => self.raise_conflict(ctx, path, ConflictKind::Removed),
            Observation::Changed(_) if dirty => {
                self.raise_conflict(ctx, path, ConflictKind::ModifiedExternally)
            }
            Observation::Changed(modified) => self.reload(ctx, path, modified),
        }
    }
}

impl AgentCycle for WatcherCycle {
    fn id(&self) -> &'static str {
        "watcher"
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn on_start(&self, ctx: &AgentContext, wake: Arc<Notify>) -> Result<(), AgentFailure> {
        if !ctx.config.watcher.use_notify {
            return Ok(());
        }
        let handler = move |res: notify::Result<notify::Event>| match res {
            Ok(event) if !event.kind.is_access() => wake.notify_one(),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Watch error"),
        };
        match notify::recommended_watcher(handler) {
            Ok(notifier) => {
                *self.notifier.lock() = Some(notifier);
                self.watch_parents(&ctx.store);
            }
            Err(err) => warn!(error = %err, "Filesystem notifications unavailable, polling only"),
        }
        Ok(())
    }

    fn on_stop(&self) {
        self.notifier.lock().take();
        self.watched_dirs.lock().clear();
    }

    fn run_cycle(&self, ctx: &AgentContext) -> Result<(), AgentFailure> {
        self.watch_parents(&ctx.store);
        for path in ctx.store.paths() {
            self.poll(ctx, &path);
        }
        Ok(())
    }
}
