//! Resilient decoder for free-text model output.
//!
//! The service is asked for NDJSON (one `{"idx":…,"text":…}` object per
//! line) but real responses get wrapped in code fences, rendered as a JSON
//! array, squeezed onto one line, or — most commonly — carry unescaped `"`
//! characters inside the text field. Decoding walks an ordered chain of
//! named fallback strategies and returns the first success; when every tier
//! fails, the strict per-line diagnostic is returned because it pinpoints
//! the broken line.

use crate::error::DecodeError;
use crate::record::{ParsedLine, WireItem};

/// Maximum length of error excerpts before they are elided.
pub const ABBREVIATION_MAX: usize = 250;

/// Result of decoding one batch response.
#[derive(Debug)]
pub struct Decoded {
    pub lines: Vec<ParsedLine>,
    /// Number of lines recovered by the targeted repair heuristic,
    /// reported for observability.
    pub salvaged: usize,
}

/// One tier of the fallback chain. Every tier has the same
/// `(text) -> Result<Decoded>` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseStrategy {
    /// Extract balanced `{…}` segments and strictly parse each.
    BalancedBraces,
    /// Split on newlines and strictly parse each non-blank line. Exists
    /// mainly to produce a precise per-line diagnostic.
    StrictLines,
    /// Like `StrictLines`, but broken lines go through the targeted
    /// unescaped-quote repair.
    LinesWithRepair,
    /// Last resort: targeted repair applied to the brace-balanced segments
    /// (covers broken escaping that also broke the one-per-line shape).
    RepairSegments,
}

const FALLBACK_CHAIN: [ParseStrategy; 4] = [
    ParseStrategy::BalancedBraces,
    ParseStrategy::StrictLines,
    ParseStrategy::LinesWithRepair,
    ParseStrategy::RepairSegments,
];

/// Decode raw response text into validated parsed lines.
pub fn decode(raw: &str) -> Result<Decoded, DecodeError> {
    let normalized = raw.replace("\r\n", "\n");
    let text = strip_code_fences(&normalized).trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    if text.starts_with('[') {
        return parse_json_array(text);
    }

    let mut strict_err = None;
    for strategy in FALLBACK_CHAIN {
        match strategy.apply(text) {
            Ok(decoded) => {
                if decoded.salvaged > 0 {
                    tracing::debug!(
                        salvaged = decoded.salvaged,
                        "salvaged invalid json lines in translation output"
                    );
                }
                if strategy == ParseStrategy::RepairSegments {
                    tracing::debug!(
                        "salvaged invalid json output by repairing extracted json objects"
                    );
                }
                return Ok(decoded);
            }
            // Keep the strict per-line error: it is the most actionable.
            Err(e) if strategy == ParseStrategy::StrictLines => strict_err = Some(e),
            Err(_) => {}
        }
    }
    Err(strict_err.unwrap_or(DecodeError::NoLines))
}

impl ParseStrategy {
    fn apply(self, text: &str) -> Result<Decoded, DecodeError> {
        match self {
            Self::BalancedBraces => parse_segments(text),
            Self::StrictLines => parse_lines(text, false),
            Self::LinesWithRepair => parse_lines(text, true),
            Self::RepairSegments => repair_segments(text),
        }
    }
}

fn parse_json_array(text: &str) -> Result<Decoded, DecodeError> {
    let items: Vec<WireItem> = serde_json::from_str(text).map_err(DecodeError::InvalidArray)?;
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let idx = positive_idx(item.idx).ok_or(DecodeError::InvalidIdx { idx: item.idx })?;
        lines.push(ParsedLine {
            idx,
            text: item.text,
        });
    }
    if lines.is_empty() {
        return Err(DecodeError::NoLines);
    }
    Ok(Decoded { lines, salvaged: 0 })
}

fn parse_segments(text: &str) -> Result<Decoded, DecodeError> {
    let segments = extract_segments(text);
    if segments.is_empty() {
        return Err(DecodeError::NoLines);
    }

    let mut lines = Vec::with_capacity(segments.len());
    for (i, seg) in segments.iter().enumerate() {
        let item: WireItem =
            serde_json::from_str(seg.json).map_err(|source| DecodeError::InvalidSegment {
                ordinal: i + 1,
                offset: seg.offset,
                source,
                excerpt: abbreviate(seg.json, ABBREVIATION_MAX),
            })?;
        let idx = positive_idx(item.idx).ok_or(DecodeError::InvalidIdxInSegment {
            ordinal: i + 1,
            offset: seg.offset,
            idx: item.idx,
        })?;
        lines.push(ParsedLine {
            idx,
            text: item.text,
        });
    }
    Ok(Decoded { lines, salvaged: 0 })
}

fn parse_lines(text: &str, repair: bool) -> Result<Decoded, DecodeError> {
    let mut lines = Vec::new();
    let mut salvaged = 0;
    for (line_no, line) in text.split('\n').enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WireItem>(line) {
            Ok(item) => {
                let idx = positive_idx(item.idx).ok_or(DecodeError::InvalidIdxAtLine {
                    line: line_no + 1,
                    idx: item.idx,
                    excerpt: abbreviate(line, ABBREVIATION_MAX),
                })?;
                lines.push(ParsedLine {
                    idx,
                    text: item.text,
                });
            }
            Err(strict_err) => {
                if repair {
                    if let Some((raw_idx, text)) = extract_idx_and_text(line) {
                        if let Some(idx) = positive_idx(raw_idx) {
                            lines.push(ParsedLine { idx, text });
                            salvaged += 1;
                            continue;
                        }
                    }
                }
                // Preserve the strict error for diagnostics.
                return Err(DecodeError::InvalidLine {
                    line: line_no + 1,
                    source: strict_err,
                    excerpt: abbreviate(line, ABBREVIATION_MAX),
                });
            }
        }
    }
    if lines.is_empty() {
        return Err(DecodeError::NoLines);
    }
    Ok(Decoded { lines, salvaged })
}

fn repair_segments(text: &str) -> Result<Decoded, DecodeError> {
    let segments = extract_segments(text);
    if segments.is_empty() {
        return Err(DecodeError::NoLines);
    }

    let mut lines = Vec::with_capacity(segments.len());
    for (i, seg) in segments.iter().enumerate() {
        let cannot_salvage = || DecodeError::CannotSalvage {
            ordinal: i + 1,
            offset: seg.offset,
            excerpt: abbreviate(seg.json, ABBREVIATION_MAX),
        };
        let (raw_idx, text) = extract_idx_and_text(seg.json).ok_or_else(cannot_salvage)?;
        let idx = positive_idx(raw_idx).ok_or(DecodeError::InvalidIdxInSegment {
            ordinal: i + 1,
            offset: seg.offset,
            idx: raw_idx,
        })?;

        // Round-trip through a real JSON encode/decode to validate the
        // repaired escaping.
        let reencoded = serde_json::to_string(&WireItem {
            idx: raw_idx,
            text,
        })
        .map_err(|_| cannot_salvage())?;
        let item: WireItem = serde_json::from_str(&reencoded).map_err(|_| cannot_salvage())?;

        lines.push(ParsedLine {
            idx,
            text: item.text,
        });
    }
    Ok(Decoded { lines, salvaged: 0 })
}

fn positive_idx(idx: i64) -> Option<u32> {
    if idx > 0 && idx <= i64::from(u32::MAX) {
        Some(idx as u32)
    } else {
        None
    }
}

struct Segment<'a> {
    offset: usize,
    json: &'a str,
}

/// Extract every top-level balanced `{…}` segment, tracking string and
/// escape state so braces inside string values do not count.
fn extract_segments(s: &str) -> Vec<Segment<'_>> {
    let bytes = s.as_bytes();
    let mut segments = Vec::new();
    let mut in_str = false;
    let mut esc = false;
    let mut depth = 0usize;
    let mut start = None;

    for (i, &c) in bytes.iter().enumerate() {
        if in_str {
            if esc {
                esc = false;
            } else if c == b'\\' {
                esc = true;
            } else if c == b'"' {
                in_str = false;
            }
            continue;
        }
        match c {
            b'"' => in_str = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(begin) = start.take() {
                            segments.push(Segment {
                                offset: begin,
                                json: s[begin..=i].trim(),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }
    segments
}

/// Best-effort recovery of `idx` and `text` from an object shaped like
/// `{"idx":119,"text":"…"}` where the text may contain unescaped quotes.
///
/// A `"` is treated as the real string terminator only when it is followed
/// (after optional whitespace) by `}` or by `,"` — the start of another key.
/// Any other `"` belongs to the text and is escaped in place. Existing
/// escapes and multi-byte characters are copied through unmodified.
fn extract_idx_and_text(obj: &str) -> Option<(i64, String)> {
    let obj = obj.trim();
    if obj.is_empty() {
        return None;
    }
    let bytes = obj.as_bytes();

    // "idx": <number>
    let idx_key = obj.find("\"idx\"")?;
    let colon = idx_key + obj[idx_key..].find(':')?;
    let mut p = skip_ws(bytes, colon + 1);
    let num_start = p;
    if p < bytes.len() && bytes[p] == b'-' {
        p += 1;
    }
    while p < bytes.len() && bytes[p].is_ascii_digit() {
        p += 1;
    }
    if p == num_start || (bytes[num_start] == b'-' && p == num_start + 1) {
        return None;
    }
    let idx: i64 = obj[num_start..p].parse().ok()?;

    // "text": "<string…>
    let text_key = obj.find("\"text\"")?;
    let colon = text_key + obj[text_key..].find(':')?;
    let mut q = skip_ws(bytes, colon + 1);
    if q >= bytes.len() || bytes[q] != b'"' {
        return None;
    }
    q += 1; // past opening quote

    let mut raw: Vec<u8> = Vec::with_capacity(obj.len());
    let mut terminated = false;
    while q < bytes.len() {
        let c = bytes[q];
        if c == b'"' {
            let k = skip_ws(bytes, q + 1);
            if k < bytes.len() {
                if bytes[k] == b'}' {
                    terminated = true;
                    break;
                }
                if bytes[k] == b',' {
                    let k2 = skip_ws(bytes, k + 1);
                    if k2 < bytes.len() && bytes[k2] == b'"' {
                        terminated = true;
                        break;
                    }
                }
            }
            // Unescaped quote inside the text value.
            raw.push(b'\\');
            raw.push(b'"');
            q += 1;
            continue;
        }
        if c == b'\\' {
            raw.push(b'\\');
            q += 1;
            if q >= bytes.len() {
                // Dangling backslash; the string never terminated.
                break;
            }
            raw.push(bytes[q]);
            q += 1;
            continue;
        }
        raw.push(c);
        q += 1;
    }
    if !terminated {
        return None;
    }

    // Decode the (possibly repaired) JSON string content with a real JSON
    // decoder by wrapping it back in quotes.
    let mut wrapped = Vec::with_capacity(raw.len() + 2);
    wrapped.push(b'"');
    wrapped.extend_from_slice(&raw);
    wrapped.push(b'"');
    let wrapped = String::from_utf8(wrapped).ok()?;
    let decoded: String = serde_json::from_str(&wrapped).ok()?;

    Some((idx, decoded))
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\n' | b'\r') {
        i += 1;
    }
    i
}

fn strip_code_fences(s: &str) -> &str {
    let mut s = s.trim();
    if !s.starts_with("```") {
        return s;
    }
    // Drop the opening fence line.
    if let Some(i) = s.find('\n') {
        s = &s[i + 1..];
    }
    // Drop the closing fence.
    if let Some(j) = s.rfind("```") {
        s = &s[..j];
    }
    s
}

/// Trim and cap `s` at `max` bytes, eliding with `...`. Never splits a
/// UTF-8 character.
pub fn abbreviate(s: &str, max: usize) -> String {
    let s = s.trim();
    if max == 0 || s.len() <= max {
        return s.to_string();
    }
    let floor = |mut n: usize| {
        while n > 0 && !s.is_char_boundary(n) {
            n -= 1;
        }
        n
    };
    if max <= 3 {
        return s[..floor(max)].to_string();
    }
    format!("{}...", &s[..floor(max - 3)])
}
