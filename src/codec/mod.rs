//! Chunk codec
//!
//! Reads a RIFF/WAVE byte buffer into an ordered chunk table plus decoded metadata
//! fields, and writes it back. `fmt `, `data` and unknown chunks are opaque; `iXML`,
//! `bext` and `LIST`/`INFO` are decoded. A known chunk is re-encoded only when the
//! fields no longer match what its payload decodes to.

pub mod bext;
pub mod info;
pub mod ixml;
pub mod riff;

pub use riff::write_riff;

use crate::error::{EncodeError, ParseError};
use crate::record::MetadataFields;
use crate::types::ChunkId;
use bext::BextFields;
use info::InfoList;
use serde::Serialize;

/// One RIFF chunk. The size field is the payload length; the pad byte is implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl ChunkRecord {
    pub fn new(id: ChunkId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Result of parsing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavDocument {
    pub chunks: Vec<ChunkRecord>,
    pub fields: MetadataFields,
}

fn is_info_list(chunk: &ChunkRecord) -> bool {
    chunk.id == ChunkId::LIST && chunk.payload.get(..4) == Some(ChunkId::INFO.as_bytes().as_slice())
}

/// Parse a complete RIFF/WAVE file. The first `iXML`, `bext` and INFO list are
/// decoded; later duplicates stay opaque.
pub fn parse(bytes: &[u8]) -> Result<WavDocument, ParseError> {
    let located = riff::read_chunks(bytes)?;
    let mut fields = MetadataFields::default();
    let (mut seen_ixml, mut seen_bext, mut seen_info) = (false, false, false);

    for entry in &located {
        let chunk = &entry.chunk;
        if chunk.id == ChunkId::IXML && !seen_ixml {
            seen_ixml = true;
            fields.ixml = ixml::decode(&chunk.payload).map_err(|reason| ParseError::MalformedIxml {
                offset: entry.offset,
                reason,
            })?;
        } else if chunk.id == ChunkId::BEXT && !seen_bext {
            seen_bext = true;
            fields.bext = BextFields::decode(&chunk.payload).map_err(|len| ParseError::TruncatedBext {
                offset: entry.offset,
                len,
            })?;
        } else if is_info_list(chunk) && !seen_info {
            seen_info = true;
            fields.info = InfoList::decode(&chunk.payload)
                .map_err(|reason| ParseError::MalformedInfo {
                    offset: entry.offset,
                    reason,
                })?
                .unwrap_or_default();
        }
    }

    Ok(WavDocument {
        chunks: located.into_iter().map(|l| l.chunk).collect(),
        fields,
    })
}

/// Rebuild the chunk table for `fields`, keeping order and reusing every payload
/// whose decoded value still matches. New metadata chunks are appended at the end.
pub fn rebuild_chunks(chunks: &[ChunkRecord], fields: &MetadataFields) -> Vec<ChunkRecord> {
    let mut out = Vec::with_capacity(chunks.len() + 3);
    let (mut seen_ixml, mut seen_bext, mut seen_info) = (false, false, false);

    for chunk in chunks {
        if chunk.id == ChunkId::IXML && !seen_ixml {
            seen_ixml = true;
            let unchanged = ixml::decode(&chunk.payload).map_or(false, |doc| doc == fields.ixml);
            out.push(if unchanged {
                chunk.clone()
            } else {
                ChunkRecord::new(ChunkId::IXML, ixml::encode(&fields.ixml))
            });
        } else if chunk.id == ChunkId::BEXT && !seen_bext {
            seen_bext = true;
            let unchanged = BextFields::decode(&chunk.payload).map_or(false, |b| b == fields.bext);
            out.push(if unchanged {
                chunk.clone()
            } else {
                ChunkRecord::new(ChunkId::BEXT, fields.bext.encode())
            });
        } else if is_info_list(chunk) && !seen_info {
            seen_info = true;
            let unchanged = matches!(InfoList::decode(&chunk.payload), Ok(Some(list)) if list == fields.info);
            out.push(if unchanged {
                chunk.clone()
            } else {
                ChunkRecord::new(ChunkId::LIST, fields.info.encode())
            });
        } else {
            out.push(chunk.clone());
        }
    }

    if !seen_ixml && !fields.ixml.is_empty() {
        out.push(ChunkRecord::new(ChunkId::IXML, ixml::encode(&fields.ixml)));
    }
    if !seen_bext && !fields.bext.is_blank() {
        out.push(ChunkRecord::new(ChunkId::BEXT, fields.bext.encode()));
    }
    if !seen_info && !fields.info.is_empty() {
        out.push(ChunkRecord::new(ChunkId::LIST, fields.info.encode()));
    }
    out
}

/// Serialize chunks with `fields` folded in.
pub fn serialize(chunks: &[ChunkRecord], fields: &MetadataFields) -> Result<Vec<u8>, EncodeError> {
    write_riff(&rebuild_chunks(chunks, fields))
}
