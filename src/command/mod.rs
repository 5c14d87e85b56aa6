//! Command/undo engine
//!
//! Every mutation of the record set is a [`Command`] with an explicit `apply` and
//! `inverse`. Applying a command and then its inverse restores all tracked fields
//! exactly; `None` stands for an absent field so removals invert too.

pub mod history;

pub use history::UndoHistory;

use crate::error::CommandError;
use crate::record::fields::display_name;
use crate::record::MetadataRecord;
use std::path::{Path, PathBuf};

/// What a command mutates. Implemented by the store state.
pub trait CommandTarget {
    fn record_mut(&mut self, path: &Path) -> Option<&mut MetadataRecord>;

    /// Rename the file on disk and re-key its record.
    fn rename_record(&mut self, from: &Path, to: &Path) -> Result<(), CommandError>;

    /// Take a record out of the loaded set. The file is left alone.
    fn take_record(&mut self, path: &Path) -> Option<MetadataRecord>;

    /// Put a taken record back. Fails if its path is occupied.
    fn restore_record(&mut self, record: MetadataRecord) -> Result<(), CommandError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    EditField {
        path: PathBuf,
        field: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    /// Rename the file at `path` (whose name is `old_name`) to `new_name` in the
    /// same directory.
    RenameFile {
        path: PathBuf,
        old_name: String,
        new_name: String,
    },
    /// Drop records from the loaded set. `removed` is filled in when applied and is
    /// what undo puts back.
    RemoveRecords {
        paths: Vec<PathBuf>,
        removed: Vec<MetadataRecord>,
    },
    RestoreRecords {
        records: Vec<MetadataRecord>,
    },
    Batch {
        description: String,
        members: Vec<Command>,
    },
}

/// A new file name must be a single, non-empty path component.
pub fn validate_file_name(name: &str) -> Result<(), CommandError> {
    let invalid = |reason: &str| CommandError::InvalidFileName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() || name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains('/') || name.contains('\\') || name.contains(std::path::MAIN_SEPARATOR) {
        return Err(invalid("name contains a path separator"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is a relative path component"));
    }
    if name.contains('\0') {
        return Err(invalid("name contains NUL"));
    }
    Ok(())
}

impl Command {
    /// Apply to `target`. Returns the command as applied: field names resolved to
    /// where the value is stored and values as they read back, so its inverse
    /// restores `target` exactly.
    pub fn apply<T: CommandTarget + ?Sized>(&self, target: &mut T) -> Result<Command, CommandError> {
        match self {
            Command::EditField {
                path,
                field,
                old_value,
                new_value,
            } => {
                let field_error = |source| CommandError::Field {
                    path: path.clone(),
                    source,
                };
                let record = target
                    .record_mut(path)
                    .ok_or_else(|| CommandError::RecordNotFound(path.clone()))?;
                let current = record.fields().get(field).map_err(field_error)?;
                if current != *old_value {
                    return Err(CommandError::StaleValue {
                        path: path.clone(),
                        field: field.clone(),
                        expected: old_value.clone(),
                        found: current,
                    });
                }
                let stored = record.fields().storage_name(field).map_err(field_error)?;
                record
                    .fields_mut()
                    .set(&stored, new_value.as_deref())
                    .map_err(field_error)?;
                let new_value = record.fields().get(&stored).map_err(field_error)?;
                Ok(Command::EditField {
                    path: path.clone(),
                    field: stored,
                    old_value: current,
                    new_value,
                })
            }
            Command::RenameFile {
                path,
                old_name,
                new_name,
            } => {
                validate_file_name(new_name)?;
                let current = path.file_name().map(|n| n.to_string_lossy().into_owned());
                if current.as_deref() != Some(old_name.as_str()) {
                    return Err(CommandError::StaleValue {
                        path: path.clone(),
                        field: crate::record::fields::FILENAME.to_string(),
                        expected: Some(old_name.clone()),
                        found: current,
                    });
                }
                target.rename_record(path, &path.with_file_name(new_name))?;
                Ok(self.clone())
            }
            Command::RemoveRecords { paths, .. } => {
                let mut removed = Vec::with_capacity(paths.len());
                for path in paths {
                    match target.take_record(path) {
                        Some(record) => removed.push(record),
                        None => {
                            for record in removed {
                                target.restore_record(record)?;
                            }
                            return Err(CommandError::RecordNotFound(path.clone()));
                        }
                    }
                }
                Ok(Command::RemoveRecords {
                    paths: paths.clone(),
                    removed,
                })
            }
            Command::RestoreRecords { records } => {
                for (index, record) in records.iter().enumerate() {
                    if let Err(err) = target.restore_record(record.clone()) {
                        for restored in &records[..index] {
                            target.take_record(restored.path());
                        }
                        return Err(err);
                    }
                }
                Ok(self.clone())
            }
            Command::Batch {
                description,
                members,
            } => {
                let mut applied = Vec::with_capacity(members.len());
                for (index, member) in members.iter().enumerate() {
                    match member.apply(target) {
                        Ok(done) => applied.push(done),
                        Err(err) => {
                            rollback(&applied, target, index)?;
                            return Err(CommandError::BatchMemberFailed {
                                index,
                                source: Box::new(err),
                            });
                        }
                    }
                }
                Ok(Command::Batch {
                    description: description.clone(),
                    members: applied,
                })
            }
        }
    }

    pub fn inverse(&self) -> Command {
        match self {
            Command::EditField {
                path,
                field,
                old_value,
                new_value,
            } => Command::EditField {
                path: path.clone(),
                field: field.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            Command::RenameFile {
                path,
                old_name,
                new_name,
            } => Command::RenameFile {
                path: path.with_file_name(new_name),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },
            Command::RemoveRecords { removed, .. } => Command::RestoreRecords {
                records: removed.clone(),
            },
            Command::RestoreRecords { records } => Command::RemoveRecords {
                paths: records.iter().map(|r| r.path().to_path_buf()).collect(),
                removed: records.clone(),
            },
            Command::Batch {
                description,
                members,
            } => Command::Batch {
                description: description.clone(),
                members: members.iter().rev().map(Command::inverse).collect(),
            },
        }
    }

    /// Short label for undo/redo menus.
    pub fn description(&self) -> String {
        match self {
            Command::EditField { field, .. } => format!("Edit {}", display_name(field)),
            Command::RenameFile { old_name, new_name, .. } => {
                format!("Rename {old_name} to {new_name}")
            }
            Command::RemoveRecords { paths, .. } => match paths.as_slice() {
                [one] => format!("Remove {}", file_label(one)),
                many => format!("Remove {} files", many.len()),
            },
            Command::RestoreRecords { records } => match records.as_slice() {
                [one] => format!("Restore {}", one.filename()),
                many => format!("Restore {} files", many.len()),
            },
            Command::Batch { description, .. } => description.clone(),
        }
    }

    /// Every store key the command reads or writes, renames contributing both names.
    pub fn affected_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths.sort();
        paths.dedup();
        paths
    }

    fn collect_paths(&self, out: &mut Vec<PathBuf>) {
        match self {
            Command::EditField { path, .. } => out.push(path.clone()),
            Command::RenameFile { path, new_name, .. } => {
                out.push(path.clone());
                out.push(path.with_file_name(new_name));
            }
            Command::RemoveRecords { paths, .. } => out.extend(paths.iter().cloned()),
            Command::RestoreRecords { records } => {
                out.extend(records.iter().map(|r| r.path().to_path_buf()))
            }
            Command::Batch { members, .. } => {
                for member in members {
                    member.collect_paths(out);
                }
            }
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn rollback<T: CommandTarget + ?Sized>(
    applied: &[Command],
    target: &mut T,
    failed_index: usize,
) -> Result<(), CommandError> {
    for member in applied.iter().rev() {
        member
            .inverse()
            .apply(target)
            .map_err(|err| CommandError::RollbackFailed {
                index: failed_index,
                reason: err.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::codec::{self, write_riff, ChunkRecord};
    use crate::types::ChunkId;
    use std::collections::HashMap;

    /// In-memory target; renames only re-key.
    #[derive(Default)]
    pub struct MemoryTarget {
        pub records: HashMap<PathBuf, MetadataRecord>,
    }

    impl MemoryTarget {
        pub fn with_records(paths: &[&str]) -> Self {
            let mut target = Self::default();
            for path in paths {
                let bytes = write_riff(&[
                    ChunkRecord::new(ChunkId::FMT, vec![0; 16]),
                    ChunkRecord::new(
                        ChunkId::IXML,
                        b"<BWFXML><SCENE>1</SCENE><TAKE>01</TAKE></BWFXML>".to_vec(),
                    ),
                    ChunkRecord::new(ChunkId::DATA, vec![0; 4]),
                ])
                .unwrap();
                let doc = codec::parse(&bytes).unwrap();
                let path = PathBuf::from(path);
                target
                    .records
                    .insert(path.clone(), MetadataRecord::from_document(path, doc, None));
            }
            target
        }

        pub fn field(&self, path: &str, field: &str) -> Option<String> {
            self.records[Path::new(path)].fields().get(field).unwrap()
        }
    }

    impl CommandTarget for MemoryTarget {
        fn record_mut(&mut self, path: &Path) -> Option<&mut MetadataRecord> {
            self.records.get_mut(path)
        }

        fn rename_record(&mut self, from: &Path, to: &Path) -> Result<(), CommandError> {
            if self.records.contains_key(to) {
                return Err(CommandError::TargetExists(to.to_path_buf()));
            }
            let mut record = self
                .records
                .remove(from)
                .ok_or_else(|| CommandError::RecordNotFound(from.to_path_buf()))?;
            record.set_path(to.to_path_buf());
            self.records.insert(to.to_path_buf(), record);
            Ok(())
        }

        fn take_record(&mut self, path: &Path) -> Option<MetadataRecord> {
            self.records.remove(path)
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
}
