//! Size-bounded batch construction.

use crate::error::TranslateError;
use crate::record::{serialize_item, Record};

/// A bounded group of records sent together in one request.
///
/// `ids` and `texts` are parallel sequences built from a contiguous slice of
/// the job's records. Batches are created once per job and are immutable
/// thereafter.
#[derive(Debug, Clone)]
pub struct Batch {
    pub ids: Vec<u32>,
    pub texts: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Group an ordered record sequence into batches whose serialized NDJSON
/// size (each line plus one separator byte) stays within `max_chars`.
///
/// The boundary is decided with the exact serialization the transport will
/// send, so the guarantee is size-exact, not approximate. A batch always
/// contains at least the record it started with, even if that single
/// record's serialized size exceeds the budget.
pub fn build_batches(records: &[Record], max_chars: usize) -> Result<Vec<Batch>, TranslateError> {
    if max_chars == 0 {
        return Err(TranslateError::Config(
            "max batch chars must be positive".into(),
        ));
    }

    let mut batches = Vec::new();
    let mut start = 0;
    while start < records.len() {
        let (batch, next) = build_one(records, start, max_chars)?;
        batches.push(batch);
        start = next;
    }
    Ok(batches)
}

fn build_one(
    records: &[Record],
    start: usize,
    max_chars: usize,
) -> Result<(Batch, usize), TranslateError> {
    let mut ids = Vec::new();
    let mut texts = Vec::new();
    let mut chars = 0usize;

    for (i, record) in records.iter().enumerate().skip(start) {
        let encoded = serialize_item(record.id, &record.text)?;
        let line_len = encoded.len() + 1;
        // Always include at least the record the batch started with.
        if i > start && chars + line_len > max_chars {
            return Ok((Batch { ids, texts }, i));
        }
        ids.push(record.id);
        texts.push(record.text.clone());
        chars += line_len;
    }
    Ok((Batch { ids, texts }, records.len()))
}
