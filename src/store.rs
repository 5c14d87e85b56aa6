//! Shared record store
//!
//! Lock order, outermost first: undo history, record sections (sorted by path),
//! then the map lock. The map lock is held only for in-memory work.

use crate::command::CommandTarget;
use crate::concurrency::RecordLockManager;
use crate::error::CommandError;
use crate::events::ConflictKind;
use crate::record::MetadataRecord;
use crate::validation::ValidationReport;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything guarded by the map lock.
#[derive(Debug, Default)]
pub struct StoreState {
    records: HashMap<PathBuf, MetadataRecord>,
    validity: HashMap<PathBuf, ValidationReport>,
    conflicts: HashMap<PathBuf, ConflictKind>,
}

/// What happened when a freshly parsed record was offered to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Replaced,
    /// An existing record had unsaved edits and was kept.
    KeptDirty,
}

impl StoreState {
    pub fn record(&self, path: &Path) -> Option<&MetadataRecord> {
        self.records.get(path)
    }

    pub fn records(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.values()
    }

    pub fn validity(&self, path: &Path) -> Option<&ValidationReport> {
        self.validity.get(path)
    }

    pub fn conflict(&self, path: &Path) -> Option<ConflictKind> {
        self.conflicts.get(path).copied()
    }

    pub(crate) fn record_entry(&mut self, path: &Path) -> Option<&mut MetadataRecord> {
        self.records.get_mut(path)
    }

    pub(crate) fn insert_record(&mut self, record: MetadataRecord) -> InsertOutcome {
        let path = record.path().to_path_buf();
        match self.records.get(&path) {
            Some(existing) if existing.is_dirty() => InsertOutcome::KeptDirty,
            Some(_) => {
                self.records.insert(path.clone(), record);
                self.conflicts.remove(&path);
                InsertOutcome::Replaced
            }
            None => {
                self.records.insert(path, record);
                InsertOutcome::Inserted
            }
        }
    }

    pub(crate) fn replace_record(&mut self, record: MetadataRecord) {
        let path = record.path().to_path_buf();
        self.conflicts.remove(&path);
        self.records.insert(path, record);
    }

    pub(crate) fn remove_record(&mut self, path: &Path) -> Option<MetadataRecord> {
        self.validity.remove(path);
        self.conflicts.remove(path);
        self.records.remove(path)
    }

    pub(crate) fn set_validity(&mut self, report: ValidationReport) {
        self.validity.insert(report.path.clone(), report);
    }

    pub(crate) fn set_conflict(&mut self, path: &Path, kind: ConflictKind) {
        self.conflicts.insert(path.to_path_buf(), kind);
    }

    pub(crate) fn clear_conflict(&mut self, path: &Path) -> Option<ConflictKind> {
        self.conflicts.remove(path)
    }
}

impl CommandTarget for StoreState {
    fn record_mut(&mut self, path: &Path) -> Option<&mut MetadataRecord> {
        self.records.get_mut(path)
    }

    fn rename_record(&mut self, from: &Path, to: &Path) -> Result<(), CommandError> {
        if !self.records.contains_key(from) {
            return Err(CommandError::RecordNotFound(from.to_path_buf()));
        }
        if self.records.contains_key(to) || to.exists() {
            return Err(CommandError::TargetExists(to.to_path_buf()));
        }
        std::fs::rename(from, to).map_err(|source| CommandError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })?;

        let mut record = self
            .records
            .remove(from)
            .ok_or_else(|| CommandError::RecordNotFound(from.to_path_buf()))?;
        record.set_path(to.to_path_buf());
        if let Ok(modified) = std::fs::metadata(to).and_then(|m| m.modified()) {
            record.set_last_known_modified(Some(modified));
        }
        self.records.insert(to.to_path_buf(), record);
        if let Some(mut report) = self.validity.remove(from) {
            report.path = to.to_path_buf();
            self.validity.insert(to.to_path_buf(), report);
        }
        if let Some(kind) = self.conflicts.remove(from) {
            self.conflicts.insert(to.to_path_buf(), kind);
        }
        info!(from = %from.display(), to = %to.display(), "Renamed file");
        Ok(())
    }

    fn take_record(&mut self, path: &Path) -> Option<MetadataRecord> {
        self.remove_record(path)
    }

    fn restore_record(&mut self, record: MetadataRecord) -> Result<(), CommandError> {
        let path = record.path().to_path_buf();
        if self.records.contains_key(&path) {
            return Err(CommandError::TargetExists(path));
        }
        self.records.insert(path, record);
        Ok(())
    }
}

/// Path-keyed record map plus per-record writer sections.
#[derive(Default)]
pub struct Store {
    state: RwLock<StoreState>,
    sections: RecordLockManager,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write()
    }

    pub fn sections(&self) -> &RecordLockManager {
        &self.sections
    }

    pub fn get(&self, path: &Path) -> Option<MetadataRecord> {
        self.read().record(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.read().records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All record paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.read().records.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Paths of records with unsaved edits, sorted.
    pub fn dirty_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .read()
            .records
            .values()
            .filter(|r| r.is_dirty())
            .map(|r| r.path().to_path_buf())
            .collect();
        paths.sort();
        paths
    }

    /// Conflicted paths, sorted.
    pub fn conflicts(&self) -> Vec<(PathBuf, ConflictKind)> {
        let mut conflicts: Vec<(PathBuf, ConflictKind)> = self
            .read()
            .conflicts
            .iter()
            .map(|(p, k)| (p.clone(), *k))
            .collect();
        conflicts.sort_by(|a, b| a.0.cmp(&b.0));
        conflicts
    }

    /// Offer a freshly parsed record, holding its section. Dirty records are kept.
    pub fn insert(&self, record: MetadataRecord) -> InsertOutcome {
        let section = self.sections.get_lock(record.path());
        let _section = section.write();
        self.write().insert_record(record)
    }
}
