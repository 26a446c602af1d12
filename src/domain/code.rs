//! Guest code normalization and validation
//!
//! A guest code is exactly 6 characters drawn from `[A-Z0-9]`. Raw input
//! arrives from two places with different rules:
//! - `Scanned` - camera payload, trimmed and uppercased, never repaired
//! - `Manual` - typed into the entry field, which also drops anything
//!   outside the alphabet and stops at 6 characters

use crate::domain::error::{DrinksError, Result};
use serde::{Deserialize, Serialize};

/// Length of every guest code
pub const CODE_LEN: usize = 6;

/// Where a raw code came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Scanned,
    Manual,
}

impl InputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputSource::Scanned => "scanned",
            InputSource::Manual => "manual",
        }
    }
}

/// Validated guest code. Only constructible through [`parse_code`] or
/// [`validate`], so holding one means the lexical rule already passed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GuestCode(String);

impl GuestCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GuestCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for GuestCode {
    type Err = DrinksError;

    fn from_str(s: &str) -> Result<Self> {
        parse_code(s, InputSource::Scanned)
    }
}

impl TryFrom<String> for GuestCode {
    type Error = DrinksError;

    fn try_from(value: String) -> Result<Self> {
        parse_code(&value, InputSource::Scanned)
    }
}

impl From<GuestCode> for String {
    fn from(code: GuestCode) -> Self {
        code.0
    }
}

#[inline]
fn is_code_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit()
}

/// Scanner normalization: trim + uppercase, nothing else
pub fn normalize_scanned(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Entry field filter: uppercase, keep only `[A-Z0-9]`, at most 6 chars.
///
/// Applied on every keystroke, so feeding its output back in is a no-op.
pub fn sanitize_typed(raw: &str) -> String {
    raw.to_uppercase().chars().filter(|&c| is_code_char(c)).take(CODE_LEN).collect()
}

/// Check an already-normalized value against the code pattern
pub fn validate(normalized: &str) -> Result<GuestCode> {
    if normalized.is_empty() {
        return Err(DrinksError::EmptyInput);
    }

    let well_formed =
        normalized.len() == CODE_LEN && normalized.chars().all(is_code_char);
    if !well_formed {
        return Err(DrinksError::MalformedCode { input: normalized.to_string() });
    }

    Ok(GuestCode(normalized.to_string()))
}

/// Normalize raw input according to its source, then validate it.
///
/// Whitespace-only input is `EmptyInput` for both sources. Typed input that
/// had characters but none survived the filter is `MalformedCode`.
pub fn parse_code(raw: &str, source: InputSource) -> Result<GuestCode> {
    if raw.trim().is_empty() {
        return Err(DrinksError::EmptyInput);
    }

    let normalized = match source {
        InputSource::Scanned => normalize_scanned(raw),
        InputSource::Manual => sanitize_typed(raw),
    };

    if normalized.is_empty() {
        return Err(DrinksError::MalformedCode { input: raw.trim().to_string() });
    }

    validate(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_malformed(result: Result<GuestCode>) -> bool {
        matches!(result, Err(DrinksError::MalformedCode { .. }))
    }

    #[test]
    fn test_valid_codes_pass_through() {
        for code in ["ABC123", "XYZ789", "000000", "ZZZZZZ", "A1B2C3"] {
            assert_eq!(validate(code).unwrap().as_str(), code);
            assert_eq!(parse_code(code, InputSource::Scanned).unwrap().as_str(), code);
            assert_eq!(parse_code(code, InputSource::Manual).unwrap().as_str(), code);
        }
    }

    #[test]
    fn test_lowercase_is_uppercased() {
        assert_eq!(parse_code("abc123", InputSource::Scanned).unwrap().as_str(), "ABC123");
        assert_eq!(parse_code("aBc123", InputSource::Manual).unwrap().as_str(), "ABC123");
    }

    #[test]
    fn test_scanned_is_trimmed() {
        assert_eq!(parse_code("  xyz789\n", InputSource::Scanned).unwrap().as_str(), "XYZ789");
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        for raw in ["A", "ABC12", "ABC1234", "ABCDEFGHIJ"] {
            assert!(is_malformed(parse_code(raw, InputSource::Scanned)), "{raw}");
            assert!(is_malformed(validate(raw)), "{raw}");
        }
    }

    #[test]
    fn test_bad_characters_are_malformed() {
        for raw in ["ABC-12", "ABC 12", "usr_a4", "ÁBC123", "ABC12!"] {
            assert!(is_malformed(validate(raw)), "{raw}");
        }
    }

    #[test]
    fn test_scanned_is_not_repaired() {
        // The entry field would strip the dash, the scanner must not
        assert!(is_malformed(parse_code("ABC-123", InputSource::Scanned)));
        assert_eq!(parse_code("ABC-123", InputSource::Manual).unwrap().as_str(), "ABC123");
    }

    #[test]
    fn test_manual_short_input_is_malformed() {
        assert!(is_malformed(parse_code("ab-12", InputSource::Manual)));
        assert!(is_malformed(parse_code("ab-12", InputSource::Scanned)));
    }

    #[test]
    fn test_manual_only_symbols_is_malformed() {
        assert!(is_malformed(parse_code("--!!", InputSource::Manual)));
    }

    #[test]
    fn test_empty_input() {
        for raw in ["", "   ", "\t\n"] {
            assert_eq!(parse_code(raw, InputSource::Scanned), Err(DrinksError::EmptyInput));
            assert_eq!(parse_code(raw, InputSource::Manual), Err(DrinksError::EmptyInput));
        }
        assert_eq!(validate(""), Err(DrinksError::EmptyInput));
    }

    #[test]
    fn test_sanitize_typed() {
        assert_eq!(sanitize_typed("ab-12"), "AB12");
        assert_eq!(sanitize_typed("abc123xyz"), "ABC123");
        assert_eq!(sanitize_typed(" x y z 7 8 9 "), "XYZ789");
        let once = sanitize_typed("a!b@c#1$2%3");
        assert_eq!(sanitize_typed(&once), once);
    }

    #[test]
    fn test_from_str_and_serde() {
        let code: GuestCode = "def456".parse().unwrap();
        assert_eq!(code.to_string(), "DEF456");

        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"DEF456\"");
        let back: GuestCode = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(back.as_str(), "ABC123");
        assert!(serde_json::from_str::<GuestCode>("\"usr_a49fd8\"").is_err());
    }
}
