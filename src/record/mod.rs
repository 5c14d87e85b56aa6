//! Metadata record model
//!
//! One [`MetadataRecord`] per loaded file: the raw chunk table as last parsed or
//! written, the editable field overlay, and the snapshot the overlay is compared
//! against for the dirty flag.

pub mod fields;
pub mod filename_patterns;
pub mod summary;

pub use fields::{FieldName, MetadataFields, TypedField};
pub use summary::RecordSummary;

use crate::codec::{self, ChunkRecord, WavDocument};
use crate::error::{FieldError, LoadError};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    path: PathBuf,
    chunks: Vec<ChunkRecord>,
    fields: MetadataFields,
    snapshot: MetadataFields,
    last_known_modified: Option<SystemTime>,
}

impl MetadataRecord {
    pub fn from_document(path: PathBuf, document: WavDocument, modified: Option<SystemTime>) -> Self {
        Self {
            path,
            chunks: document.chunks,
            snapshot: document.fields.clone(),
            fields: document.fields,
            last_known_modified: modified,
        }
    }

    /// Read, stat and parse a file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let modified = std::fs::metadata(path).map_err(io_err)?.modified().ok();
        let bytes = std::fs::read(path).map_err(io_err)?;
        let document = codec::parse(&bytes).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            chunks = document.chunks.len(),
            ixml_entries = document.fields.ixml.len(),
            "Parsed WAV metadata"
        );
        Ok(Self::from_document(path.to_path_buf(), document, modified))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn fields(&self) -> &MetadataFields {
        &self.fields
    }

    pub fn snapshot(&self) -> &MetadataFields {
        &self.snapshot
    }

    pub fn last_known_modified(&self) -> Option<SystemTime> {
        self.last_known_modified
    }

    pub fn is_dirty(&self) -> bool {
        self.fields != self.snapshot
    }

    /// Field value by API name. `Filename` is answered from the path.
    pub fn get_field(&self, name: &str) -> Result<Option<String>, FieldError> {
        if name == fields::FILENAME {
            return Ok(Some(self.filename()));
        }
        self.fields.get(name)
    }

    pub fn summary(&self) -> RecordSummary {
        summary::summarize(&self.filename(), &self.fields, self.is_dirty())
    }

    /// Chunks with the current fields folded in, as a save would write them.
    pub fn rebuilt_chunks(&self) -> Vec<ChunkRecord> {
        codec::rebuild_chunks(&self.chunks, &self.fields)
    }

    pub(crate) fn fields_mut(&mut self) -> &mut MetadataFields {
        &mut self.fields
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    pub(crate) fn set_last_known_modified(&mut self, modified: Option<SystemTime>) {
        self.last_known_modified = modified;
    }

    /// Fold a successful write into the record.
    pub(crate) fn commit_save(
        &mut self,
        chunks: Vec<ChunkRecord>,
        written: MetadataFields,
        modified: Option<SystemTime>,
    ) {
        self.chunks = chunks;
        self.snapshot = written;
        self.last_known_modified = modified;
    }
}
