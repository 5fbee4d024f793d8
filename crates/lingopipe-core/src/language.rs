//! Target-language tag normalization.
//!
//! Users hand us BCP-47-ish tags ("es", "es-MX", "es_419", patterns like
//! "es-*"). Prompts work better with a human-friendly label, so a small
//! explicit mapping covers the common cases and everything else falls back
//! to the normalized tag.

pub const LANGUAGE_ENGLISH: &str = "English";
pub const LANGUAGE_ENGLISH_US: &str = "English (US)";
pub const LANGUAGE_ENGLISH_UK: &str = "English (UK)";
pub const LANGUAGE_SPANISH_LATIN: &str = "Spanish (Neutral Latin American)";
pub const LANGUAGE_SPANISH_SPAIN: &str = "Spanish (Spain)";
pub const LANGUAGE_SPANISH_NEUTRAL: &str = "Spanish (Neutral)";

const SPANISH_LATIN_ALIASES: &[&str] = &["ea", "es-419", "es-ea", "es-la", "es-mx", "es-*", "spl"];

/// Normalize a target-language input and return `(tag, label)`.
///
/// `tag` is the cleaned-up tag/pattern, kept for traceability; `label` is
/// the prompt-friendly variant. Intentionally conservative: only a small set
/// of common values is mapped, everything else falls back to the normalized
/// input.
pub fn normalize_target_language(input: &str) -> (String, String) {
    let mut tag = input.trim().replace('_', "-");
    while tag.contains("--") {
        tag = tag.replace("--", "-");
    }
    if tag.is_empty() {
        return (String::new(), String::new());
    }

    // Canonical-ish casing: lowercase language, uppercase 2-letter region,
    // lowercase 3-char region (usually digits).
    let mut parts: Vec<String> = tag.split('-').map(str::to_string).collect();
    if let Some(first) = parts.first_mut() {
        *first = first.to_lowercase();
    }
    if let Some(second) = parts.get_mut(1) {
        if second.len() == 2 {
            *second = second.to_uppercase();
        } else if second.len() == 3 {
            *second = second.to_lowercase();
        }
    }
    let tag = parts.join("-");
    let lower = tag.to_lowercase();

    if (lower.starts_with("es-") && lower != "es-es") || SPANISH_LATIN_ALIASES.contains(&lower.as_str())
    {
        return (tag, LANGUAGE_SPANISH_LATIN.to_string());
    }

    let label = match lower.as_str() {
        "en" => LANGUAGE_ENGLISH,
        "en-us" => LANGUAGE_ENGLISH_US,
        "en-gb" => LANGUAGE_ENGLISH_UK,
        "es" | "spa" => LANGUAGE_SPANISH_NEUTRAL,
        "es-es" => LANGUAGE_SPANISH_SPAIN,
        _ => return (tag.clone(), tag),
    };
    (tag, label.to_string())
}

/// The prompt-friendly label for a target-language input, falling back to
/// the raw input when normalization produces nothing.
pub fn normalize_target_language_label(input: &str) -> String {
    let (_, label) = normalize_target_language(input);
    if label.is_empty() {
        input.to_string()
    } else {
        label
    }
}
