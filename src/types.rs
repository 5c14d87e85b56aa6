//! Core types shared by the codec and the store.

use serde::{Serialize, Serializer};
use std::fmt;

/// Four-character RIFF chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub [u8; 4]);

impl ChunkId {
    pub const RIFF: ChunkId = ChunkId(*b"RIFF");
    pub const WAVE: ChunkId = ChunkId(*b"WAVE");
    pub const FMT: ChunkId = ChunkId(*b"fmt ");
    pub const DATA: ChunkId = ChunkId(*b"data");
    pub const IXML: ChunkId = ChunkId(*b"iXML");
    pub const BEXT: ChunkId = ChunkId(*b"bext");
    pub const LIST: ChunkId = ChunkId(*b"LIST");
    pub const INFO: ChunkId = ChunkId(*b"INFO");

    /// Read an id from the first four bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(ChunkId(raw))
    }

    /// Parse a four-character textual id such as `"ICMT"`.
    pub fn parse(text: &str) -> Option<Self> {
        let id = Self::from_slice(text.as_bytes())?;
        (text.len() == 4 && id.is_printable()).then_some(id)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// RIFF ids are printable ASCII; anything else means we are reading garbage.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| (0x20..=0x7e).contains(b))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({:?})", self.to_string())
    }
}

impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
