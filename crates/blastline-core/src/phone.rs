//! Phone normalization: canonical transport addresses from arbitrary input.
//!
//! The canonical form is the E.164 digit string without the leading `+`
//! (e.g. `919876543210`). It is the dedup key for the duplicate ledger, so
//! two spellings of the same number must always normalize identically.

use crate::error::{BlastlineError, Result};

/// A normalized, structurally valid recipient address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    /// The bare E.164 digit string.
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// The transport chat id (`<digits>@c.us` for individual chats).
    pub fn chat_id(&self) -> String {
        format!("{}@c.us", self.0)
    }
}

impl std::fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a raw phone string into a canonical address.
///
/// `default_country_code` is prepended to national-format numbers (those
/// without `+`/`00` that are too short to already carry a country code).
pub fn normalize(raw: &str, default_country_code: &str) -> Result<CanonicalAddress> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BlastlineError::InvalidPhone("empty input".into()));
    }

    // Strip common formatting: spaces, dashes, dots, parens.
    let mut compact: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '\t'))
        .collect();

    // International prefixes: "+CC..." and "00CC..." both mean the digits
    // already carry a country code.
    let has_country_code = if let Some(rest) = compact.strip_prefix('+') {
        compact = rest.to_string();
        true
    } else if let Some(rest) = compact.strip_prefix("00") {
        compact = rest.to_string();
        true
    } else {
        false
    };

    if !compact.chars().all(|c| c.is_ascii_digit()) {
        return Err(BlastlineError::InvalidPhone(format!(
            "non-digit characters in '{trimmed}'"
        )));
    }

    let digits = if has_country_code {
        compact
    } else {
        // National format: drop trunk zeros, then prepend the default code.
        let national = compact.trim_start_matches('0');
        if national.is_empty() {
            return Err(BlastlineError::InvalidPhone(format!("only zeros in '{trimmed}'")));
        }
        if national.len() > 10 && national.starts_with(default_country_code) {
            // Already spelled with the country code, just without "+".
            national.to_string()
        } else {
            format!("{default_country_code}{national}")
        }
    };

    // E.164: up to 15 digits; anything under 8 cannot address a subscriber.
    if digits.len() < 8 || digits.len() > 15 {
        return Err(BlastlineError::InvalidPhone(format!(
            "'{trimmed}' normalizes to {} digits",
            digits.len()
        )));
    }

    Ok(CanonicalAddress(digits))
}
