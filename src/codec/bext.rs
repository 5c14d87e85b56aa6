//! Broadcast-Wave `bext` chunk (EBU Tech 3285).
//!
//! Only the leading text fields, the time reference and the version are decoded.
//! Everything from the UMID on is kept as raw bytes so a rewrite is lossless.

use serde::Serialize;

pub const DESCRIPTION_LEN: usize = 256;
pub const ORIGINATOR_LEN: usize = 32;
pub const ORIGINATOR_REFERENCE_LEN: usize = 32;
pub const ORIGINATION_DATE_LEN: usize = 10;
pub const ORIGINATION_TIME_LEN: usize = 8;

const TIME_REFERENCE_AT: usize = 338;
const VERSION_AT: usize = 346;
/// Bytes up to and including the version field.
pub const MIN_LEN: usize = 348;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BextFields {
    pub description: String,
    pub originator: String,
    pub originator_reference: String,
    pub origination_date: String,
    pub origination_time: String,
    /// Sample count since midnight.
    pub time_reference: u64,
    pub version: u16,
    #[serde(skip)]
    pub tail: Vec<u8>,
}

fn read_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn write_text(out: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(width);
    out.extend_from_slice(&bytes[..len]);
    out.resize(out.len() + (width - len), 0);
}

impl BextFields {
    /// Decode a `bext` payload. Returns the payload length when it is too short.
    pub fn decode(payload: &[u8]) -> Result<Self, usize> {
        if payload.len() < MIN_LEN {
            return Err(payload.len());
        }
        let mut at = 0;
        let mut field = |width: usize| {
            let text = read_text(&payload[at..at + width]);
            at += width;
            text
        };
        let description = field(DESCRIPTION_LEN);
        let originator = field(ORIGINATOR_LEN);
        let originator_reference = field(ORIGINATOR_REFERENCE_LEN);
        let origination_date = field(ORIGINATION_DATE_LEN);
        let origination_time = field(ORIGINATION_TIME_LEN);

        let low = u32::from_le_bytes([
            payload[TIME_REFERENCE_AT],
            payload[TIME_REFERENCE_AT + 1],
            payload[TIME_REFERENCE_AT + 2],
            payload[TIME_REFERENCE_AT + 3],
        ]);
        let high = u32::from_le_bytes([
            payload[TIME_REFERENCE_AT + 4],
            payload[TIME_REFERENCE_AT + 5],
            payload[TIME_REFERENCE_AT + 6],
            payload[TIME_REFERENCE_AT + 7],
        ]);
        let version = u16::from_le_bytes([payload[VERSION_AT], payload[VERSION_AT + 1]]);

        Ok(Self {
            description,
            originator,
            originator_reference,
            origination_date,
            origination_time,
            time_reference: ((high as u64) << 32) | low as u64,
            version,
            tail: payload[MIN_LEN..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_LEN + self.tail.len());
        write_text(&mut out, &self.description, DESCRIPTION_LEN);
        write_text(&mut out, &self.originator, ORIGINATOR_LEN);
        write_text(&mut out, &self.originator_reference, ORIGINATOR_REFERENCE_LEN);
        write_text(&mut out, &self.origination_date, ORIGINATION_DATE_LEN);
        write_text(&mut out, &self.origination_time, ORIGINATION_TIME_LEN);
        out.extend_from_slice(&(self.time_reference as u32).to_le_bytes());
        out.extend_from_slice(&((self.time_reference >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.tail);
        out
    }

    /// All-default fields: what a file without a `bext` chunk decodes to.
    pub fn is_blank(&self) -> bool {
        *self == Self::default()
    }
}
