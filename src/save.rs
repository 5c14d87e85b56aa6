//! Save pipeline
//!
//! Each record is written under its writer section: rebuild, back up the original,
//! write and fsync a temp sibling, re-parse it, then rename it over the original.
//! Any failure leaves the original untouched and the record dirty.

use crate::codec::{self, riff, ChunkRecord};
use crate::config::ValidationConfig;
use crate::error::{ConflictError, SaveError};
use crate::events::{ConflictKind, CoordinatorEvent, EventBus, SaveOutcome};
use crate::record::MetadataFields;
use crate::store::Store;
use crate::validation::validate_record;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

pub const BACKUP_SUFFIX: &str = ".wavmeta-bak";
pub const TEMP_SUFFIX: &str = ".wavmeta-tmp";

/// Whether a file name belongs to a backup or temp sibling written here.
pub fn is_save_artifact(name: &str) -> bool {
    name.starts_with('.') && (name.ends_with(BACKUP_SUFFIX) || name.ends_with(TEMP_SUFFIX))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Unchanged,
}

#[derive(Debug)]
pub struct SaveReport {
    pub path: PathBuf,
    pub result: Result<SaveStatus, SaveError>,
}

impl SaveReport {
    pub fn outcome(&self) -> SaveOutcome {
        match &self.result {
            Ok(SaveStatus::Saved) => SaveOutcome::Saved,
            Ok(SaveStatus::Unchanged) => SaveOutcome::Unchanged,
            Err(err) => SaveOutcome::Failed {
                kind: err.kind(),
                detail: err.to_string(),
            },
        }
    }
}

pub struct SavePipeline {
    store: Arc<Store>,
    events: EventBus,
    validation: ValidationConfig,
}

impl SavePipeline {
    pub fn new(store: Arc<Store>, events: EventBus, validation: ValidationConfig) -> Self {
        Self {
            store,
            events,
            validation,
        }
    }

    /// Save each path in turn. One file's failure never stops the others.
    pub fn save_paths(&self, paths: &[PathBuf]) -> Vec<SaveReport> {
        paths
            .iter()
            .map(|path| {
                let result = self.save_one(path);
                let report = SaveReport {
                    path: path.clone(),
                    result,
                };
                self.publish(&report);
                report
            })
            .collect()
    }

    fn publish(&self, report: &SaveReport) {
        match &report.result {
            Ok(SaveStatus::Saved) => {
                info!(path = %report.path.display(), "Saved metadata");
                self.events.emit(CoordinatorEvent::RecordChanged {
                    path: report.path.clone(),
                });
            }
            Ok(SaveStatus::Unchanged) => {
                debug!(path = %report.path.display(), "Record clean, nothing to save");
            }
            Err(err) => {
                warn!(path = %report.path.display(), kind = ?err.kind(), error = %err, "Save failed");
            }
        }
        self.events.emit(CoordinatorEvent::SaveComplete {
            path: report.path.clone(),
            outcome: report.outcome(),
        });
    }

    /// Save one record while holding its section.
    pub fn save_one(&self, path: &Path) -> Result<SaveStatus, SaveError> {
        let section = self.store.sections().get_lock(path);
        let _section = section.write();

        let record = self
            .store
            .get(path)
            .ok_or_else(|| SaveError::RecordNotFound(path.to_path_buf()))?;
        if !record.is_dirty() {
            return Ok(SaveStatus::Unchanged);
        }

        if let Some(kind) = detect_external_change(path, record.last_known_modified()) {
            let newly_raised = {
                let mut state = self.store.write();
                let fresh = state.conflict(path).is_none();
                state.set_conflict(path, kind);
                fresh
            };
            if newly_raised {
                self.events.emit(CoordinatorEvent::ConflictDetected {
                    path: path.to_path_buf(),
                    kind,
                });
            }
            return Err(ConflictError {
                path: path.to_path_buf(),
                kind,
            }
            .into());
        }

        if self.validation.block_save_on_invalid {
            let report = validate_record(&record, &self.validation);
            let valid = report.is_valid();
            let issues = report.issues();
            self.store.write().set_validity(report);
            if !valid {
                return Err(SaveError::Invalid {
                    path: path.to_path_buf(),
                    issues,
                });
            }
        }

        let chunks = record.rebuilt_chunks();
        let bytes = riff::write_riff(&chunks).map_err(|source| SaveError::Encode {
            path: path.to_path_buf(),
            source,
        })?;

        let modified = write_atomically(path, &bytes, &chunks, record.fields())?;

        let mut state = self.store.write();
        let entry = state
            .record_entry(path)
            .ok_or_else(|| SaveError::RecordNotFound(path.to_path_buf()))?;
        entry.commit_save(chunks, record.fields().clone(), modified);
        state.clear_conflict(path);
        Ok(SaveStatus::Saved)
    }
}

/// `None` when the file on disk is still the one last loaded or written.
fn detect_external_change(path: &Path, last_known: Option<SystemTime>) -> Option<ConflictKind> {
    let last_known = last_known?;
    match fs::metadata(path) {
        Err(_) => Some(ConflictKind::Removed),
        Ok(meta) => match meta.modified() {
            Ok(on_disk) if on_disk != last_known => Some(ConflictKind::ModifiedExternally),
            _ => None,
        },
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}{suffix}"))
}

fn io_error<'a>(path: &'a Path, op: &'static str) -> impl FnOnce(std::io::Error) -> SaveError + 'a {
    move |source| SaveError::Io {
        path: path.to_path_buf(),
        op,
        source,
    }
}

/// Backup, temp write, verify, rename. Returns the new mtime.
fn write_atomically(
    path: &Path,
    bytes: &[u8],
    chunks: &[ChunkRecord],
    fields: &MetadataFields,
) -> Result<Option<SystemTime>, SaveError> {
    let backup = if path.exists() {
        let backup = sibling(path, BACKUP_SUFFIX);
        fs::copy(path, &backup).map_err(io_error(path, "backup"))?;
        Some(backup)
    } else {
        None
    };

    let result = replace_with_verified(path, bytes, chunks, fields);

    if let Some(backup) = backup {
        if let Err(err) = fs::remove_file(&backup) {
            warn!(backup = %backup.display(), error = %err, "Failed to remove save backup");
        }
    }
    result
}

fn replace_with_verified(
    path: &Path,
    bytes: &[u8],
    chunks: &[ChunkRecord],
    fields: &MetadataFields,
) -> Result<Option<SystemTime>, SaveError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Dropping the temp file on an early return deletes it.
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(io_error(path, "create temp file"))?;
    temp.write_all(bytes).map_err(io_error(path, "write temp file"))?;
    if let Ok(meta) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(meta.permissions())
            .map_err(io_error(path, "copy permissions"))?;
    }
    temp.as_file().sync_all().map_err(io_error(path, "fsync temp file"))?;

    let written = fs::read(temp.path()).map_err(io_error(path, "re-read temp file"))?;
    let reparsed = codec::parse(&written).map_err(|err| SaveError::Verification {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    if reparsed.chunks.as_slice() != chunks {
        return Err(SaveError::Verification {
            path: path.to_path_buf(),
            reason: "chunk table differs from the rebuilt table".to_string(),
        });
    }
    if &reparsed.fields != fields {
        return Err(SaveError::Verification {
            path: path.to_path_buf(),
            reason: "re-parsed fields differ from the intended fields".to_string(),
        });
    }

    temp.persist(path)
        .map_err(|err| io_error(path, "rename temp file")(err.error))?;

    Ok(fs::metadata(path).and_then(|m| m.modified()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_riff;
    use crate::record::MetadataRecord;
    use crate::types::ChunkId;

    fn write_take(path: &Path) {
        let bytes = write_riff(&[
            ChunkRecord::new(ChunkId::FMT, vec![1; 16]),
            ChunkRecord::new(
                ChunkId::IXML,
                b"<BWFXML><SCENE>5.14D</SCENE><TAKE>01</TAKE></BWFXML>".to_vec(),
            ),
            ChunkRecord::new(ChunkId::DATA, vec![7; 33]),
        ])
        .unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn pipeline(dir: &Path) -> (Arc<Store>, SavePipeline, PathBuf) {
        let path = dir.join("take.wav");
        write_take(&path);
        let store = Arc::new(Store::new());
        store.insert(MetadataRecord::load(&path).unwrap());
        let saver = SavePipeline::new(store.clone(), EventBus::new(16), ValidationConfig::default());
        (store, saver, path)
    }

    fn edit(store: &Store, path: &Path, field: &str, value: &str) {
        store
            .write()
            .record_entry(path)
            .unwrap()
            .fields_mut()
            .set(field, Some(value))
            .unwrap();
    }

    fn siblings(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_clean_record_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, saver, path) = pipeline(dir.path());
        let before = fs::read(&path).unwrap();
        assert_eq!(saver.save_one(&path).unwrap(), SaveStatus::Unchanged);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_save_writes_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let (store, saver, path) = pipeline(dir.path());
        edit(&store, &path, "Take", "02");

        assert_eq!(saver.save_one(&path).unwrap(), SaveStatus::Saved);
        let record = store.get(&path).unwrap();
        assert!(!record.is_dirty());
        assert_eq!(
            record.last_known_modified(),
            fs::metadata(&path).unwrap().modified().ok()
        );

        let reloaded = MetadataRecord::load(&path).unwrap();
        assert_eq!(reloaded.get_field("Take").unwrap().as_deref(), Some("02"));
        let data = reloaded.chunks().iter().find(|c| c.id == ChunkId::DATA).unwrap();
        assert_eq!(data.payload, vec![7; 33]);
        assert_eq!(siblings(dir.path()), vec!["take.wav".to_string()]);
    }

    #[test]
    fn test_save_refuses_externally_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let (store, saver, path) = pipeline(dir.path());
        edit(&store, &path, "Take", "02");
        let earlier = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1);
        store.write().record_entry(&path).unwrap().set_last_known_modified(Some(earlier));
        let before = fs::read(&path).unwrap();

        let err = saver.save_one(&path).unwrap_err();
        assert!(matches!(
            err,
            SaveError::Conflict(ConflictError {
                kind: ConflictKind::ModifiedExternally,
                ..
            })
        ));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(store.get(&path).unwrap().is_dirty());
        assert_eq!(store.conflicts().len(), 1);
    }

    #[test]
    fn test_save_reports_removed_file() {
        let dir = tempfile::tempdir().unwrap();
        let (store, saver, path) = pipeline(dir.path());
        edit(&store, &path, "Take", "02");
        fs::remove_file(&path).unwrap();
        let err = saver.save_one(&path).unwrap_err();
        assert!(matches!(
            err,
            SaveError::Conflict(ConflictError {
                kind: ConflictKind::Removed,
                ..
            })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_validation_gate_blocks_invalid_records() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, path) = pipeline(dir.path());
        let saver = SavePipeline::new(
            store.clone(),
            EventBus::new(16),
            ValidationConfig {
                block_save_on_invalid: true,
                ..ValidationConfig::default()
            },
        );
        edit(&store, &path, "Take", "two");
        let before = fs::read(&path).unwrap();

        match saver.save_one(&path) {
            Err(SaveError::Invalid { issues, .. }) => {
                assert!(issues.iter().any(|i| i.starts_with("Take")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!store.read().validity(&path).unwrap().is_valid());

        edit(&store, &path, "Take", "2");
        assert_eq!(saver.save_one(&path).unwrap(), SaveStatus::Saved);
    }

    #[tokio::test]
    async fn test_save_paths_reports_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let (store, saver, path) = pipeline(dir.path());
        let mut rx = saver.events.subscribe();
        edit(&store, &path, "Scene", "6");
        let missing = dir.path().join("missing.wav");

        let reports = saver.save_paths(&[path.clone(), missing.clone()]);
        assert!(matches!(reports[0].result, Ok(SaveStatus::Saved)));
        assert!(matches!(reports[1].result, Err(SaveError::RecordNotFound(_))));

        assert_eq!(rx.recv().await.unwrap(), CoordinatorEvent::RecordChanged { path: path.clone() });
        assert_eq!(
            rx.recv().await.unwrap(),
            CoordinatorEvent::SaveComplete {
                path,
                outcome: SaveOutcome::Saved
            }
        );
        match rx.recv().await.unwrap() {
            CoordinatorEvent::SaveComplete { path, outcome } => {
                assert_eq!(path, missing);
                assert!(outcome.is_failure());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_save_artifact_names() {
        assert!(is_save_artifact(".take.wav.wavmeta-bak"));
        assert!(is_save_artifact(".take.wav.a1b2c3.wavmeta-tmp"));
        assert!(!is_save_artifact("take.wav"));
        assert_eq!(
            sibling(Path::new("/x/take.wav"), BACKUP_SUFFIX),
            PathBuf::from("/x/.take.wav.wavmeta-bak")
        );
    }
}
