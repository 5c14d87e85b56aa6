//! Agent coordinator
//!
//! The single entry point collaborators talk to. Owns the store, the undo history,
//! the event bus, the save pipeline and the agents. Interactive commands are
//! synchronous; loading, saving in bulk and agent lifecycle are async.
//!
//! Lock order for commands: history, then every affected record section sorted by
//! path, then the store's map lock.

use crate::agent::{
    Agent, AgentContext, AgentState, AutoSaveAgent, AutoSaveCycle, FileWatcherAgent, ValidationAgent,
    ValidationCycle, WatcherCycle,
};
use crate::command::{Command, UndoHistory};
use crate::config::WavMetaConfig;
use crate::error::{ApiError, CommandError, ErrorKind, LoadError, MirrorError, SaveError};
use crate::events::{ConflictKind, CoordinatorEvent, EventBus, FailureReport};
use crate::load::{self, CancelFlag, ScanMessage};
use crate::mirror::{self, MirrorOptions, MirrorReport};
use crate::record::filename_patterns::{extraction_batch, FilenamePattern};
use crate::record::{fields::FILENAME, MetadataRecord, RecordSummary};
use crate::save::{SavePipeline, SaveReport};
use crate::store::{InsertOutcome, Store, StoreState};
use crate::validation::ValidationReport;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// How to settle a conflict between unsaved edits and a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the in-memory edits; the next save overwrites the file.
    KeepMine,
    /// Discard the edits and reload from disk.
    ReloadTheirs,
}

/// Totals of one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub successes: usize,
    pub failures: Vec<FailureReport>,
    pub cancelled: bool,
}

pub struct Coordinator {
    config: Arc<WavMetaConfig>,
    store: Arc<Store>,
    history: Mutex<UndoHistory>,
    events: EventBus,
    saver: Arc<SavePipeline>,
    agents: Vec<Arc<dyn Agent>>,
}

impl Coordinator {
    pub fn new(config: WavMetaConfig) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(Store::new());
        let events = EventBus::new(config.events.capacity);
        let saver = Arc::new(SavePipeline::new(
            store.clone(),
            events.clone(),
            config.validation.clone(),
        ));
        let ctx = AgentContext {
            store: store.clone(),
            saver: saver.clone(),
            events: events.clone(),
            config: config.clone(),
        };
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(AutoSaveAgent::new(AutoSaveCycle, ctx.clone())),
            Arc::new(FileWatcherAgent::new(WatcherCycle::new(), ctx.clone())),
            Arc::new(ValidationAgent::new(ValidationCycle, ctx)),
        ];

        Self {
            history: Mutex::new(UndoHistory::new(config.undo.max_depth)),
            config,
            store,
            events,
            saver,
            agents,
        }
    }

    pub fn config(&self) -> &WavMetaConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    // Queries

    /// Display rows for every record, sorted by path.
    pub fn records(&self) -> Vec<(PathBuf, RecordSummary)> {
        let state = self.store.read();
        let mut rows: Vec<(PathBuf, RecordSummary)> = state
            .records()
            .map(|r| (r.path().to_path_buf(), r.summary()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn record(&self, path: &Path) -> Option<MetadataRecord> {
        self.store.get(path)
    }

    pub fn field(&self, path: &Path, name: &str) -> Result<Option<String>, ApiError> {
        let state = self.store.read();
        let record = state
            .record(path)
            .ok_or_else(|| ApiError::RecordNotFound(path.to_path_buf()))?;
        record
            .get_field(name)
            .map_err(|source| CommandError::Field {
                path: path.to_path_buf(),
                source,
            })
            .map_err(ApiError::from)
    }

    pub fn is_dirty(&self, path: &Path) -> bool {
        self.store.read().record(path).map(|r| r.is_dirty()).unwrap_or(false)
    }

    pub fn dirty_paths(&self) -> Vec<PathBuf> {
        self.store.dirty_paths()
    }

    pub fn validity(&self, path: &Path) -> Option<ValidationReport> {
        self.store.read().validity(path).cloned()
    }

    pub fn conflicts(&self) -> Vec<(PathBuf, ConflictKind)> {
        self.store.conflicts()
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().can_redo()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.history.lock().peek_undo().map(Command::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.history.lock().peek_redo().map(Command::description)
    }

    pub fn agent_states(&self) -> Vec<(&'static str, AgentState)> {
        self.agents.iter().map(|a| (a.id(), a.status())).collect()
    }

    // Commands

    /// Apply and record a command. On failure nothing changes.
    pub fn execute(&self, command: Command) -> Result<(), ApiError> {
        let paths = command.affected_paths();
        let mut history = self.history.lock();
        let sections = self.store.sections().ordered(&paths);
        let _guards: Vec<_> = sections.iter().map(|s| s.write()).collect();
        let result = history.execute(command, &mut *self.store.write());
        drop(_guards);
        drop(history);
        self.finish_mutation(&paths, result)
    }

    /// Set one field. `Filename` is turned into a rename.
    pub fn edit_field(&self, path: &Path, field: &str, value: Option<&str>) -> Result<(), ApiError> {
        if field == FILENAME {
            let name = value.ok_or_else(|| CommandError::InvalidFileName {
                name: String::new(),
                reason: "a file name cannot be removed".to_string(),
            })?;
            return self.rename_file(path, name);
        }
        let (old_value, new_value) = self.prepare_edit(path, field, value)?;
        if old_value == new_value {
            return Ok(());
        }
        self.execute(Command::EditField {
            path: path.to_path_buf(),
            field: field.to_string(),
            old_value,
            new_value,
        })
    }

    pub fn rename_file(&self, path: &Path, new_name: &str) -> Result<(), ApiError> {
        if !self.store.contains(path) {
            return Err(ApiError::RecordNotFound(path.to_path_buf()));
        }
        let old_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.execute(Command::RenameFile {
            path: path.to_path_buf(),
            old_name,
            new_name: new_name.to_string(),
        })
    }

    /// Set the same field on many records as one undoable step.
    pub fn batch_edit(&self, paths: &[PathBuf], field: &str, value: Option<&str>) -> Result<(), ApiError> {
        let mut members = Vec::with_capacity(paths.len());
        for path in paths {
            let (old_value, new_value) = self.prepare_edit(path, field, value)?;
            members.push(Command::EditField {
                path: path.clone(),
                field: field.to_string(),
                old_value,
                new_value,
            });
        }
        let description = format!("Edit {field} on {} files", paths.len());
        self.execute(Command::Batch {
            description,
            members,
        })
    }

    /// Drop records from the loaded set as one undoable step. Files stay on disk
    /// and unsaved edits come back with an undo.
    pub fn remove_records(&self, paths: &[PathBuf]) -> Result<(), ApiError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.execute(Command::RemoveRecords {
            paths: paths.to_vec(),
            removed: Vec::new(),
        })
    }

    /// Fill fields from file names matching `pattern` as one undoable step.
    /// Returns how many fields were set.
    pub fn extract_from_filenames(&self, paths: &[PathBuf], pattern: FilenamePattern) -> Result<usize, ApiError> {
        let batch = {
            let state = self.store.read();
            let mut records = Vec::with_capacity(paths.len());
            for path in paths {
                let record = state
                    .record(path)
                    .ok_or_else(|| ApiError::RecordNotFound(path.clone()))?;
                records.push(record);
            }
            extraction_batch(records, pattern).map_err(|source| CommandError::Field {
                path: paths.first().cloned().unwrap_or_default(),
                source,
            })?
        };
        let Some(batch) = batch else {
            info!(pattern = pattern.name(), "No fields to extract from file names");
            return Ok(0);
        };
        let count = match &batch {
            Command::Batch { members, .. } => members.len(),
            _ => 1,
        };
        self.execute(batch)?;
        info!(pattern = pattern.name(), fields = count, "Extracted fields from file names");
        Ok(count)
    }

    /// Current value and the value `value` will read back as once set, so the
    /// recorded command inverts exactly.
    fn prepare_edit(
        &self,
        path: &Path,
        field: &str,
        value: Option<&str>,
    ) -> Result<(Option<String>, Option<String>), ApiError> {
        let field_error = |source| CommandError::Field {
            path: path.to_path_buf(),
            source,
        };
        let state = self.store.read();
        let record = state
            .record(path)
            .ok_or_else(|| ApiError::RecordNotFound(path.to_path_buf()))?;
        let old_value = record.fields().get(field).map_err(field_error)?;
        let mut preview = record.fields().clone();
        preview.set(field, value).map_err(field_error)?;
        let new_value = preview.get(field).map_err(field_error)?;
        Ok((old_value, new_value))
    }

    pub fn undo(&self) -> Result<String, ApiError> {
        self.step(|history, target| history.undo(target))
    }

    pub fn redo(&self) -> Result<String, ApiError> {
        self.step(|history, target| history.redo(target))
    }

    fn step(
        &self,
        op: impl FnOnce(&mut UndoHistory, &mut StoreState) -> Result<Command, CommandError>,
    ) -> Result<String, ApiError> {
        let mut history = self.history.lock();
        let paths = history
            .peek_undo()
            .into_iter()
            .chain(history.peek_redo())
            .flat_map(Command::affected_paths)
            .collect::<Vec<_>>();
        let sections = self.store.sections().ordered(&paths);
        let _guards: Vec<_> = sections.iter().map(|s| s.write()).collect();
        let result = op(&mut *history, &mut *self.store.write());
        drop(_guards);
        drop(history);
        match result {
            Ok(command) => {
                let description = command.description();
                self.finish_mutation(&command.affected_paths(), Ok(()))?;
                Ok(description)
            }
            Err(err) => self.finish_mutation(&paths, Err(err)).map(|_| String::new()),
        }
    }

    fn finish_mutation(&self, paths: &[PathBuf], result: Result<(), CommandError>) -> Result<(), ApiError> {
        match result {
            Ok(()) => {
                for path in paths {
                    self.events.emit(CoordinatorEvent::RecordChanged { path: path.clone() });
                }
                Ok(())
            }
            Err(err) => {
                if !matches!(err, CommandError::NothingToUndo | CommandError::NothingToRedo) {
                    warn!(error = %err, "Command failed");
                    self.events.emit(CoordinatorEvent::Failure(FailureReport {
                        path: paths.first().cloned(),
                        kind: ErrorKind::Command,
                        detail: err.to_string(),
                    }));
                }
                Err(err.into())
            }
        }
    }

    // Loading

    pub async fn load(&self, root: &Path) -> Result<LoadSummary, ApiError> {
        self.load_with_cancel(root, CancelFlag::new()).await
    }

    /// Scan `root` into the store. Per-file failures are collected, never fatal.
    /// Records with unsaved edits are kept over their on-disk version.
    pub async fn load_with_cancel(&self, root: &Path, cancel: CancelFlag) -> Result<LoadSummary, ApiError> {
        let mut scan = load::scan(root, &self.config.load, cancel.clone());
        let mut successes = 0;
        let mut failures = Vec::new();

        while let Some(message) = scan.next().await {
            match message {
                ScanMessage::Parsed(record) => {
                    let path = record.path().to_path_buf();
                    let store = self.store.clone();
                    let outcome = tokio::task::spawn_blocking(move || store.insert(*record))
                        .await
                        .map_err(|e| LoadError::Worker {
                            path: path.clone(),
                            reason: e.to_string(),
                        })?;
                    if outcome == InsertOutcome::KeptDirty {
                        warn!(path = %path.display(), "Kept record with unsaved edits over reloaded file");
                    }
                    successes += 1;
                    self.events.emit(CoordinatorEvent::RecordChanged { path });
                }
                ScanMessage::Failed { path, error } => {
                    warn!(path = %path.display(), error = %error, "Failed to load file");
                    let report = FailureReport {
                        path: Some(path),
                        kind: error.kind(),
                        detail: error.to_string(),
                    };
                    self.events.emit(CoordinatorEvent::Failure(report.clone()));
                    failures.push(report);
                }
                ScanMessage::Progress { done, total } => {
                    self.events.emit(CoordinatorEvent::LoadProgress { done, total });
                }
            }
        }
        scan.close().await;

        info!(root = %root.display(), successes, failures = failures.len(), "Load complete");
        self.events.emit(CoordinatorEvent::LoadComplete {
            successes,
            failures: failures.clone(),
        });

        if self.config.load.start_agents && successes > 0 && !cancel.is_cancelled() {
            self.start_agents();
        }
        Ok(LoadSummary {
            successes,
            failures,
            cancelled: cancel.is_cancelled(),
        })
    }

    // Saving

    pub async fn save_all(&self) -> Vec<SaveReport> {
        let dirty = self.store.dirty_paths();
        self.save(&dirty).await
    }

    pub async fn save(&self, paths: &[PathBuf]) -> Vec<SaveReport> {
        let saver = self.saver.clone();
        let owned = paths.to_vec();
        match tokio::task::spawn_blocking(move || saver.save_paths(&owned)).await {
            Ok(reports) => reports,
            Err(err) => {
                warn!(error = %err, "Save worker ended abnormally");
                self.abandoned_saves(paths, &err.to_string())
            }
        }
    }

    /// Failed reports for saves whose worker died before reporting. What reached
    /// disk is unknown, so every requested path counts as failed.
    fn abandoned_saves(&self, paths: &[PathBuf], reason: &str) -> Vec<SaveReport> {
        paths
            .iter()
            .map(|path| {
                let error = SaveError::Worker {
                    path: path.clone(),
                    reason: reason.to_string(),
                };
                self.events.emit(CoordinatorEvent::Failure(FailureReport {
                    path: Some(path.clone()),
                    kind: error.kind(),
                    detail: error.to_string(),
                }));
                SaveReport {
                    path: path.clone(),
                    result: Err(error),
                }
            })
            .collect()
    }

    /// Save without a runtime, for synchronous callers.
    pub fn save_blocking(&self, paths: &[PathBuf]) -> Vec<SaveReport> {
        self.saver.save_paths(paths)
    }

    // Mirroring

    /// Copy files into `<destination>/DayNN/Takes` for take review. The copies are
    /// of the files on disk; unsaved edits are not included.
    pub async fn mirror_takes(
        &self,
        paths: &[PathBuf],
        options: MirrorOptions,
        cancel: CancelFlag,
    ) -> Result<Vec<MirrorReport>, ApiError> {
        let unsaved = paths.iter().filter(|p| self.is_dirty(p)).count();
        if unsaved > 0 {
            warn!(unsaved, "Mirroring files with unsaved edits; copies hold the saved version");
        }
        let owned = paths.to_vec();
        let reports = tokio::task::spawn_blocking(move || mirror::mirror_takes(&owned, &options, &cancel))
            .await
            .map_err(|err| MirrorError::Worker(err.to_string()))??;
        for report in &reports {
            if let Err(err) = &report.result {
                self.events.emit(CoordinatorEvent::Failure(FailureReport {
                    path: Some(report.source.clone()),
                    kind: err.kind(),
                    detail: err.to_string(),
                }));
            }
        }
        Ok(reports)
    }

    // Conflicts

    /// Settle a conflict. `ReloadTheirs` also works as a plain revert, and drops
    /// the record when its file is gone.
    pub fn resolve_conflict(&self, path: &Path, resolution: Resolution) -> Result<(), ApiError> {
        let section = self.store.sections().get_lock(path);
        let _section = section.write();
        if !self.store.contains(path) {
            return Err(ApiError::RecordNotFound(path.to_path_buf()));
        }

        match resolution {
            Resolution::KeepMine => {
                let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
                let mut state = self.store.write();
                if state.clear_conflict(path).is_none() {
                    return Ok(());
                }
                if let Some(record) = state.record_entry(path) {
                    // The next save writes over whatever is on disk now.
                    record.set_last_known_modified(modified);
                }
            }
            Resolution::ReloadTheirs if !path.exists() => {
                self.store.write().remove_record(path);
                self.store.sections().forget(path);
            }
            Resolution::ReloadTheirs => {
                let record = MetadataRecord::load(path)?;
                self.store.write().replace_record(record);
            }
        }
        info!(path = %path.display(), ?resolution, "Conflict resolved");
        self.events.emit(CoordinatorEvent::RecordChanged {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    // Agents

    /// Start every enabled agent. One agent failing to start does not stop the rest.
    pub fn start_agents(&self) {
        for agent in &self.agents {
            let interval = match agent.id() {
                "autosave" if self.config.autosave.enabled => self.config.autosave.interval(),
                "watcher" if self.config.watcher.enabled => self.config.watcher.interval(),
                "validation" if self.config.validation.enabled => self.config.validation.interval(),
                _ => continue,
            };
            if let Err(err) = agent.start(interval) {
                warn!(agent = agent.id(), error = %err, "Agent failed to start");
            }
        }
    }

    pub async fn stop_agents(&self) {
        for agent in &self.agents {
            agent.stop().await;
        }
    }

    /// Stop every agent, letting in-flight cycles finish.
    pub async fn shutdown(&self) {
        self.stop_agents().await;
        info!(dirty = self.store.dirty_paths().len(), "Coordinator shut down");
    }
}
