//! Wire types for the NDJSON translation payload.
//!
//! Contract with the LLM: we send NDJSON, one JSON object per line, and the
//! output must be exactly the same shape.
//!
//! ```text
//! {"idx":1,"text":"Hello"}
//! {"idx":2,"text":"Line 1\nLine 2"}
//! ```
//!
//! The JSON string can contain newlines via standard JSON escaping; callers
//! see real `"\n"`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// One atomic unit of text to translate. The id is unique within a job and
/// carries no ordering meaning beyond identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: u32,
    pub text: String,
}

impl Record {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// The serialized `{idx, text}` form of a record exchanged with the service.
///
/// `idx` is deserialized as `i64` so that out-of-range values coming back
/// from the model are seen (and rejected) instead of failing opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireItem {
    pub idx: i64,
    pub text: String,
}

/// One decoded line of a batch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub idx: u32,
    pub text: String,
}

/// Serialize a single record into its wire-item JSON line.
///
/// CRLF sequences are normalized to `\n` before encoding so the payload is
/// stable across input sources.
pub fn serialize_item(id: u32, text: &str) -> Result<String, TranslateError> {
    if id == 0 {
        return Err(TranslateError::Config("record id must be positive".into()));
    }
    let item = WireItem {
        idx: i64::from(id),
        text: text.replace("\r\n", "\n"),
    };
    serde_json::to_string(&item).map_err(|source| TranslateError::Serialize { id, source })
}

/// Serialize a batch's parallel id/text sequences into an NDJSON payload.
pub fn serialize_payload(ids: &[u32], texts: &[String]) -> Result<String, TranslateError> {
    if ids.len() != texts.len() {
        return Err(TranslateError::Config(
            "ids and texts length mismatch".into(),
        ));
    }
    let mut out = String::new();
    for (i, (&id, text)) in ids.iter().zip(texts.iter()).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&serialize_item(id, text)?);
    }
    Ok(out)
}

/// Materialize the output record sequence from the job's result map.
///
/// Records without an entry keep their original text — an explicit fallback,
/// not a failure. Its correctness depends on the batch validator being
/// exhaustive: only validated batches ever write into the map.
pub fn apply_translations(records: &[Record], translated: &HashMap<u32, String>) -> Vec<Record> {
    records
        .iter()
        .map(|r| {
            let text = translated.get(&r.id).cloned().unwrap_or_else(|| r.text.clone());
            Record { id: r.id, text }
        })
        .collect()
}
