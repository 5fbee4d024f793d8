//! API key parsing, round-robin rotation and log masking.

use std::sync::atomic::{AtomicU32, Ordering};

/// A set of API keys parsed from a comma-separated string, rotated
/// round-robin across requests.
///
/// The cursor advances on every successful request so load spreads across
/// keys, and `pick(true)` skips one position ahead so a retry after a
/// rejection (401/403/429) presents a different key than the one just
/// rejected.
#[derive(Debug)]
pub struct KeyRing {
    keys: Vec<String>,
    cursor: AtomicU32,
}

impl KeyRing {
    /// Parse a single key or a comma-separated list, trimming whitespace
    /// and dropping empty items.
    pub fn new(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            keys,
            cursor: AtomicU32::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key the cursor currently points at, one position ahead when
    /// `rotated` is set.
    pub fn pick(&self, rotated: bool) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        if self.keys.len() == 1 {
            return Some(&self.keys[0]);
        }
        let base = self.cursor.load(Ordering::Relaxed) as usize;
        let mut idx = base % self.keys.len();
        if rotated {
            idx = (idx + 1) % self.keys.len();
        }
        Some(&self.keys[idx])
    }

    /// Move the cursor to the next key.
    pub fn advance(&self) {
        self.cursor.fetch_add(1, Ordering::Relaxed);
    }
}

/// Mask a secret for logging: keep the first and last character, replace
/// the middle with `*`.
pub fn mask_key(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 => "*".to_string(),
        2 => format!("{}*", chars[0]),
        n => format!(
            "{}{}{}",
            chars[0],
            "*".repeat(n - 2),
            chars[n - 1]
        ),
    }
}

/// Mask every item of a separated secret list, preserving separators and
/// item formatting.
pub fn mask_keys(s: &str, separator: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    if !separator.is_empty() && s.contains(separator) {
        return s
            .split(separator)
            .map(mask_key)
            .collect::<Vec<_>>()
            .join(separator);
    }
    mask_key(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_key() {
        let ring = KeyRing::new("sk-abc");
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.pick(false), Some("sk-abc"));
        // A single key is never rotated away from.
        assert_eq!(ring.pick(true), Some("sk-abc"));
    }

    #[test]
    fn parses_comma_separated_keys_trimming_empties() {
        let ring = KeyRing::new(" k1 , ,k2,  ,k3 ");
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pick(false), Some("k1"));
    }

    #[test]
    fn empty_input_yields_no_keys() {
        assert!(KeyRing::new("").is_empty());
        assert!(KeyRing::new(" , , ").is_empty());
    }

    #[test]
    fn advance_moves_round_robin_cursor() {
        let ring = KeyRing::new("a,b,c");
        assert_eq!(ring.pick(false), Some("a"));
        ring.advance();
        assert_eq!(ring.pick(false), Some("b"));
        ring.advance();
        assert_eq!(ring.pick(false), Some("c"));
        ring.advance();
        assert_eq!(ring.pick(false), Some("a"));
    }

    #[test]
    fn rotated_pick_skips_the_rejected_key() {
        let ring = KeyRing::new("a,b,c");
        assert_eq!(ring.pick(true), Some("b"));
        ring.advance();
        assert_eq!(ring.pick(true), Some("c"));
    }

    #[test]
    fn masks_keys_of_various_lengths() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("a"), "*");
        assert_eq!(mask_key("ab"), "a*");
        assert_eq!(mask_key("abcd"), "a**d");
    }

    #[test]
    fn masks_separated_lists_preserving_formatting() {
        assert_eq!(mask_keys("abcd,ef", ","), "a**d,e*");
        assert_eq!(mask_keys("abcd", ","), "a**d");
        assert_eq!(mask_keys("", ","), "");
    }
}
