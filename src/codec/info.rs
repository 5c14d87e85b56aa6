//! `LIST` chunks of list type `INFO`.

use crate::types::ChunkId;
use serde::Serialize;
use std::collections::BTreeMap;

/// INFO sub-chunk texts keyed by their four-character id. Equality ignores order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InfoList {
    values: BTreeMap<String, String>,
    #[serde(skip)]
    order: Vec<String>,
}

impl PartialEq for InfoList {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for InfoList {}

impl InfoList {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    pub fn insert(&mut self, id: &str, text: &str) {
        if self.values.insert(id.to_string(), text.to_string()).is_none() {
            self.order.push(id.to_string());
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        let removed = self.values.remove(id)?;
        self.order.retain(|k| k != id);
        Some(removed)
    }

    /// Entries in sub-chunk order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|k| self.values.get_key_value(k))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Decode a `LIST` payload. `Ok(None)` means the list is not an INFO list.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, String> {
        if payload.get(..4) != Some(ChunkId::INFO.as_bytes().as_slice()) {
            return Ok(None);
        }
        let mut list = InfoList::default();
        let mut pos = 4;
        while pos + 8 <= payload.len() {
            let id = ChunkId::from_slice(&payload[pos..])
                .filter(ChunkId::is_printable)
                .ok_or_else(|| format!("bad sub-chunk id at list offset {pos}"))?;
            let size = u32::from_le_bytes([
                payload[pos + 4],
                payload[pos + 5],
                payload[pos + 6],
                payload[pos + 7],
            ]) as usize;
            let start = pos + 8;
            let end = start + size;
            if end > payload.len() {
                return Err(format!(
                    "sub-chunk '{id}' declares {size} bytes but only {} remain",
                    payload.len() - start
                ));
            }
            let text = &payload[start..end];
            let text_end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
            let key = id.to_string();
            // First occurrence wins for duplicated ids.
            if list.get(&key).is_none() {
                list.insert(&key, &String::from_utf8_lossy(&text[..text_end]));
            }
            pos = end + (size & 1);
        }
        Ok(Some(list))
    }

    /// Encode as a `LIST` payload, NUL-terminating and padding each text.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = ChunkId::INFO.as_bytes().to_vec();
        for (id, text) in self.entries() {
            let size = text.len() + 1;
            out.extend_from_slice(id.as_bytes());
            out.extend_from_slice(&(size as u32).to_le_bytes());
            out.extend_from_slice(text.as_bytes());
            out.push(0);
            if size % 2 == 1 {
                out.push(0);
            }
        }
        out
    }
}
