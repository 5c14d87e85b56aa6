//! Error types
//!
//! One enum per concern, aggregated into [`ApiError`] at the coordinator boundary.
//! [`ErrorKind`] classifies any failure for the structured events sent to collaborators.

use crate::events::ConflictKind;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse failure classification carried by events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Io,
    Validation,
    Conflict,
    Save,
    Command,
    Agent,
}

/// Malformed or truncated RIFF/WAVE data. Every variant carries the byte offset
/// where the problem was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("file is too short for a RIFF header ({len} bytes)")]
    TooShort { len: usize },

    #[error("missing RIFF tag at offset {offset}")]
    NotRiff { offset: usize },

    #[error("missing WAVE form type at offset {offset}")]
    NotWave { offset: usize },

    #[error("declared RIFF size {declared} at offset {offset} runs past end of file ({actual} bytes)")]
    DeclaredSizePastEof {
        offset: usize,
        declared: u64,
        actual: u64,
    },

    #[error("malformed chunk header at offset {offset}")]
    MalformedHeader { offset: usize },

    #[error("chunk '{id}' at offset {offset} declares {declared} bytes but only {available} remain")]
    TruncatedChunk {
        offset: usize,
        id: String,
        declared: u32,
        available: usize,
    },

    #[error("iXML chunk at offset {offset} is malformed: {reason}")]
    MalformedIxml { offset: usize, reason: String },

    #[error("bext chunk at offset {offset} is too short ({len} bytes)")]
    TruncatedBext { offset: usize, len: usize },

    #[error("LIST/INFO chunk at offset {offset} is malformed: {reason}")]
    MalformedInfo { offset: usize, reason: String },
}

impl ParseError {
    /// Byte offset in the source where the error was detected.
    pub fn offset(&self) -> usize {
        match self {
            ParseError::TooShort { .. } => 0,
            ParseError::NotRiff { offset }
            | ParseError::NotWave { offset }
            | ParseError::DeclaredSizePastEof { offset, .. }
            | ParseError::MalformedHeader { offset }
            | ParseError::TruncatedChunk { offset, .. }
            | ParseError::MalformedIxml { offset, .. }
            | ParseError::TruncatedBext { offset, .. }
            | ParseError::MalformedInfo { offset, .. } => *offset,
        }
    }
}

/// Failure to turn a file on disk into a record.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("parse worker for {path} did not complete: {reason}")]
    Worker { path: PathBuf, reason: String },
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::Parse { .. } => ErrorKind::Parse,
            LoadError::Io { .. } | LoadError::Worker { .. } => ErrorKind::Io,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::Worker { path, .. } => path,
        }
    }
}

/// Failure to produce RIFF bytes from a chunk table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("chunk '{id}' payload of {size} bytes exceeds the u32 size field")]
    ChunkTooLarge { id: String, size: u64 },

    #[error("RIFF body of {size} bytes exceeds the u32 size field")]
    TooLarge { size: u64 },
}

/// Rejected field name or value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("invalid field name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("value for {field} is {len} bytes, the field holds at most {max}")]
    ValueTooLong { field: String, len: usize, max: usize },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Field-level validation finding. Never fatal; collected into a report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{}{message}", field.as_ref().map(|f| format!("{f}: ")).unwrap_or_default())]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

/// External modification of a file that has unsaved edits (or that vanished).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path} was {kind} while it had unsaved changes")]
pub struct ConflictError {
    pub path: PathBuf,
    pub kind: ConflictKind,
}

/// Failure of a command, or of undo/redo.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no record loaded for {0}")]
    RecordNotFound(PathBuf),

    #[error("{field} of {path} changed underneath the command (expected {expected:?}, found {found:?})")]
    StaleValue {
        path: PathBuf,
        field: String,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("field error on {path}: {source}")]
    Field {
        path: PathBuf,
        #[source]
        source: FieldError,
    },

    #[error("invalid file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },

    #[error("cannot rename to {0}: target already exists")]
    TargetExists(PathBuf),

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("batch member {index} failed: {source}")]
    BatchMemberFailed {
        index: usize,
        #[source]
        source: Box<CommandError>,
    },

    #[error("rollback after batch member {index} failed: {reason}")]
    RollbackFailed { index: usize, reason: String },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

/// Failure to persist one record. The record stays dirty.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("no record loaded for {0}")]
    RecordNotFound(PathBuf),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("{path} failed validation: {}", issues.join("; "))]
    Invalid { path: PathBuf, issues: Vec<String> },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },

    #[error("{op} failed for {path}: {source}")]
    Io {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("written file for {path} did not verify: {reason}")]
    Verification { path: PathBuf, reason: String },

    #[error("save worker for {path} ended abnormally: {reason}")]
    Worker { path: PathBuf, reason: String },
}

impl SaveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SaveError::Conflict(_) => ErrorKind::Conflict,
            SaveError::Invalid { .. } => ErrorKind::Validation,
            SaveError::RecordNotFound(_)
            | SaveError::Encode { .. }
            | SaveError::Io { .. }
            | SaveError::Verification { .. }
            | SaveError::Worker { .. } => ErrorKind::Save,
        }
    }
}

/// Failure to copy one file into a take-review mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{0} already exists in the mirror")]
    Exists(PathBuf),

    #[error("{op} failed for {path}: {source}")]
    Io {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("mirror cancelled before {0} was copied")]
    Cancelled(PathBuf),

    #[error("mirror worker ended abnormally: {0}")]
    Worker(String),
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}

/// An agent's internal fault. The agent stops; siblings keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("agent {agent} failed: {reason}")]
pub struct AgentFailure {
    pub agent: &'static str,
    pub reason: String,
}

impl AgentFailure {
    pub fn new(agent: &'static str, reason: impl Into<String>) -> Self {
        Self {
            agent,
            reason: reason.into(),
        }
    }
}

/// Umbrella error returned by the coordinator API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Record not found: {0}")]
    RecordNotFound(PathBuf),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Agent(#[from] AgentFailure),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
