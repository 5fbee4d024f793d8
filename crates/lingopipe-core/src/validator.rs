//! Exact id-set validation of decoded batch output.

use std::collections::HashSet;

use crate::error::TranslateError;
use crate::record::ParsedLine;

/// Verify that `parsed` covers exactly the ids the batch asked for: same
/// count, no extraneous ids, no duplicates, nothing missing. Order does not
/// matter — every line carries its own id.
///
/// Violations are retryable at the batch level (the model is nondeterministic;
/// re-issuing the request usually fixes the shape). Only validated output is
/// ever merged into the job result map.
pub fn validate_batch(expected: &[u32], parsed: &[ParsedLine]) -> Result<(), TranslateError> {
    if parsed.len() != expected.len() {
        return Err(TranslateError::BatchSizeMismatch {
            expected: expected.len(),
            got: parsed.len(),
        });
    }

    let expected_set: HashSet<u32> = expected.iter().copied().collect();
    let mut seen = HashSet::with_capacity(parsed.len());
    for line in parsed {
        if !expected_set.contains(&line.idx) {
            return Err(TranslateError::UnexpectedIdx { idx: line.idx });
        }
        if !seen.insert(line.idx) {
            return Err(TranslateError::DuplicateIdx { idx: line.idx });
        }
    }
    if seen.len() != expected_set.len() {
        return Err(TranslateError::MissingIdxs {
            missing: expected_set.len() - seen.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(idxs: &[u32]) -> Vec<ParsedLine> {
        idxs.iter()
            .map(|&idx| ParsedLine {
                idx,
                text: format!("t{idx}"),
            })
            .collect()
    }

    #[test]
    fn accepts_exact_set_in_any_order() {
        assert!(validate_batch(&[1, 2, 3], &lines(&[3, 1, 2])).is_ok());
        assert!(validate_batch(&[5], &lines(&[5])).is_ok());
    }

    #[test]
    fn rejects_count_mismatch() {
        let err = validate_batch(&[1, 2, 3], &lines(&[1, 2])).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::BatchSizeMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn rejects_unexpected_idx() {
        let err = validate_batch(&[1, 2], &lines(&[1, 9])).unwrap_err();
        assert!(matches!(err, TranslateError::UnexpectedIdx { idx: 9 }));
    }

    #[test]
    fn rejects_duplicate_idx() {
        let err = validate_batch(&[1, 2], &lines(&[1, 1])).unwrap_err();
        assert!(matches!(err, TranslateError::DuplicateIdx { idx: 1 }));
    }

    #[test]
    fn rejects_missing_idx_hidden_by_duplicates() {
        // Same count, but one expected id never shows up. The duplicate is
        // caught first.
        let err = validate_batch(&[1, 2, 3], &lines(&[1, 2, 2])).unwrap_err();
        assert!(matches!(err, TranslateError::DuplicateIdx { idx: 2 }));
    }
}
