//! Header canonicalization.
//!
//! The same function keys the manual mapping dictionary and the headers read
//! at runtime, so it must stay pure: no locale, no configuration.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

pub const SEPARATOR: char = '_';

/// Canonical comparison key for a header or column name.
///
/// Trims, lower-cases, strips diacritics (NFD + combining mark removal) and
/// collapses every run of non-alphanumeric characters into one `_`. Returns
/// `None` when nothing alphanumeric is left.
pub fn normalize_header(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut normalized = String::with_capacity(trimmed.len());
    let mut pending_separator = false;
    for ch in trimmed
        .to_lowercase()
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
    {
        if ch.is_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push(SEPARATOR);
            }
            pending_separator = false;
            normalized.push(ch);
        } else {
            pending_separator = true;
        }
    }

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

pub fn split_tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(SEPARATOR).filter(|token| !token.is_empty())
}
