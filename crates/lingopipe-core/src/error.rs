//! Pipeline error types.

use thiserror::Error;

/// Errors that can occur while translating a job.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Invalid or missing configuration — fails fast, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A record's text could not be serialized into a wire item.
    #[error("cannot serialize record {id}: {source}")]
    Serialize {
        id: u32,
        #[source]
        source: serde_json::Error,
    },

    /// Network-level failure (connect refused, timeout, broken transfer).
    #[error("http error: {0}")]
    Http(String),

    /// Non-2xx response from the translation service.
    #[error("translation api error: status={status} body={body}")]
    Api { status: u16, body: String },

    /// Response envelope was malformed or carried no usable content.
    #[error("invalid chat completion response: {0}")]
    Response(String),

    /// No decoder tier could parse the response text.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Decoded output has more or fewer lines than the batch requested.
    #[error("batch size mismatch: expected {expected} lines, got {got}")]
    BatchSizeMismatch { expected: usize, got: usize },

    /// Decoded output contains an id the batch never asked for.
    #[error("unexpected idx in translated output: {idx}")]
    UnexpectedIdx { idx: u32 },

    /// Decoded output contains the same id twice.
    #[error("duplicate idx in translated output: {idx}")]
    DuplicateIdx { idx: u32 },

    /// Decoded output is missing ids the batch asked for.
    #[error("translated output missing {missing} idxs")]
    MissingIdxs { missing: usize },

    /// The operation was canceled via the shared cancellation token.
    #[error("operation canceled")]
    Canceled,
}

impl TranslateError {
    /// Returns `true` if this error is transient and worth another attempt
    /// at the transport level.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Response(_) => true,
            Self::Api { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Returns `true` if the service rejected the presented credential
    /// (the next attempt should rotate to a different one).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Api { status, .. } if is_rejected_status(*status))
    }

    /// Returns `true` if this is a decode/validation failure that the
    /// dispatcher retries at the batch level by re-issuing the request.
    pub fn is_batch_retryable(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::BatchSizeMismatch { .. }
                | Self::UnexpectedIdx { .. }
                | Self::DuplicateIdx { .. }
                | Self::MissingIdxs { .. }
        )
    }
}

/// HTTP statuses worth retrying: 429 and any 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// HTTP statuses that indicate the current credential should not be reused
/// for the next attempt.
pub fn is_rejected_status(status: u16) -> bool {
    matches!(status, 401 | 403 | 429)
}

/// Errors produced by the tiered response decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Empty or all-whitespace response text.
    #[error("empty translation output")]
    Empty,

    /// No tier produced a single parsed line.
    #[error("no translated lines parsed")]
    NoLines,

    /// The response looked like a JSON array but failed to parse as one.
    #[error("invalid json array: {0}")]
    InvalidArray(#[source] serde_json::Error),

    /// A wire item carried a non-positive idx.
    #[error("invalid idx in item: {idx}")]
    InvalidIdx { idx: i64 },

    /// One NDJSON line failed strict parsing (1-based line number).
    #[error("invalid json line {line}: {source} (line={excerpt:?})")]
    InvalidLine {
        line: usize,
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },

    /// One NDJSON line carried a non-positive idx (1-based line number).
    #[error("invalid idx in item at line {line}: {idx} (line={excerpt:?})")]
    InvalidIdxAtLine { line: usize, idx: i64, excerpt: String },

    /// A brace-balanced segment failed strict parsing.
    #[error("invalid json object #{ordinal} at offset {offset}: {source} (obj={excerpt:?})")]
    InvalidSegment {
        ordinal: usize,
        offset: usize,
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },

    /// A brace-balanced segment carried a non-positive idx.
    #[error("invalid idx in item in object #{ordinal} at offset {offset}: {idx}")]
    InvalidIdxInSegment {
        ordinal: usize,
        offset: usize,
        idx: i64,
    },

    /// A segment could not be salvaged by the targeted repair heuristic.
    #[error("cannot salvage json object #{ordinal} at offset {offset} (obj={excerpt:?})")]
    CannotSalvage {
        ordinal: usize,
        offset: usize,
        excerpt: String,
    },
}
