//! RIFF/WAVE container walking and writing.
//!
//! Chunk payloads are copied out whole; odd-sized payloads are followed by one pad
//! byte that is not counted in the size field.

use super::ChunkRecord;
use crate::error::{EncodeError, ParseError};
use crate::types::ChunkId;

/// `RIFF` + size + `WAVE`.
pub const HEADER_LEN: usize = 12;
/// Chunk id + size.
pub const CHUNK_HEADER_LEN: usize = 8;

/// A chunk together with the offset of its header in the source bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedChunk {
    pub offset: usize,
    pub chunk: ChunkRecord,
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// Validate the RIFF header and walk every chunk inside the declared region.
///
/// Bytes after the declared RIFF end are ignored. A final pad byte missing at the
/// very end of the region is tolerated.
pub fn read_chunks(bytes: &[u8]) -> Result<Vec<LocatedChunk>, ParseError> {
    if bytes.len() < HEADER_LEN {
        return Err(ParseError::TooShort { len: bytes.len() });
    }
    if &bytes[0..4] != ChunkId::RIFF.as_bytes() {
        return Err(ParseError::NotRiff { offset: 0 });
    }
    let declared = read_u32_le(bytes, 4).ok_or(ParseError::MalformedHeader { offset: 4 })? as u64;
    if &bytes[8..12] != ChunkId::WAVE.as_bytes() {
        return Err(ParseError::NotWave { offset: 8 });
    }
    let end = 8 + declared;
    if end > bytes.len() as u64 {
        return Err(ParseError::DeclaredSizePastEof {
            offset: 4,
            declared,
            actual: bytes.len() as u64,
        });
    }
    if declared < 4 {
        return Err(ParseError::MalformedHeader { offset: 4 });
    }
    let end = end as usize;

    let mut chunks = Vec::new();
    let mut pos = HEADER_LEN;
    while pos < end {
        let remaining = end - pos;
        if remaining < CHUNK_HEADER_LEN {
            // Some writers leave a few zero bytes of slack at the end of the region.
            if bytes[pos..end].iter().all(|b| *b == 0) {
                break;
            }
            return Err(ParseError::MalformedHeader { offset: pos });
        }

        let id = ChunkId::from_slice(&bytes[pos..]).ok_or(ParseError::MalformedHeader { offset: pos })?;
        if !id.is_printable() {
            return Err(ParseError::MalformedHeader { offset: pos });
        }
        let size = read_u32_le(bytes, pos + 4).ok_or(ParseError::MalformedHeader { offset: pos })?;

        let data_start = pos + CHUNK_HEADER_LEN;
        let data_end = data_start as u64 + size as u64;
        if data_end > end as u64 {
            return Err(ParseError::TruncatedChunk {
                offset: pos,
                id: id.to_string(),
                declared: size,
                available: end - data_start,
            });
        }
        let data_end = data_end as usize;

        chunks.push(LocatedChunk {
            offset: pos,
            chunk: ChunkRecord::new(id, bytes[data_start..data_end].to_vec()),
        });
        pos = data_end + (size as usize & 1);
    }

    Ok(chunks)
}

/// Size of the RIFF body (everything after the 8-byte RIFF header), pads included.
pub fn body_len(chunks: &[ChunkRecord]) -> Result<u64, EncodeError> {
    let mut total: u64 = 4;
    for chunk in chunks {
        let len = chunk.payload.len() as u64;
        if len > u32::MAX as u64 {
            return Err(EncodeError::ChunkTooLarge {
                id: chunk.id.to_string(),
                size: len,
            });
        }
        total += CHUNK_HEADER_LEN as u64 + len + (len & 1);
    }
    if total > u32::MAX as u64 {
        return Err(EncodeError::TooLarge { size: total });
    }
    Ok(total)
}

/// Write a complete RIFF/WAVE file from a chunk table, recomputing every size field.
pub fn write_riff(chunks: &[ChunkRecord]) -> Result<Vec<u8>, EncodeError> {
    let body = body_len(chunks)?;
    let mut out = Vec::with_capacity(body as usize + 8);
    out.extend_from_slice(ChunkId::RIFF.as_bytes());
    out.extend_from_slice(&(body as u32).to_le_bytes());
    out.extend_from_slice(ChunkId::WAVE.as_bytes());
    for chunk in chunks {
        out.extend_from_slice(chunk.id.as_bytes());
        out.extend_from_slice(&(chunk.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&chunk.payload);
        if chunk.payload.len() % 2 == 1 {
            out.push(0);
        }
    }
    Ok(out)
}
