//! Input validation and normalization.
//!
//! All checks operate on the trimmed input and count runes, not bytes.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum alias length in runes.
pub const ALIAS_MAX_RUNES: usize = 24;

/// Maximum message body length in runes.
pub const BODY_MAX_RUNES: usize = 2000;

/// Why an input was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("EMPTY")]
    Empty,

    #[error("TOO_LONG")]
    TooLong,

    #[error("CONTROL_CHARS")]
    ControlChars,

    #[error("INVALID")]
    Invalid,
}

fn channel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[a-z0-9_\-]{1,48}$").expect("static channel pattern"))
}

/// C0 control or DEL.
#[inline]
fn is_c0_or_del(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}')
}

/// Validate an alias: trimmed, non-empty, at most 24 runes, no C0/DEL.
pub fn alias(input: &str) -> Result<String, ValidateError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidateError::Empty);
    }
    if trimmed.chars().count() > ALIAS_MAX_RUNES {
        return Err(ValidateError::TooLong);
    }
    if trimmed.chars().any(is_c0_or_del) {
        return Err(ValidateError::ControlChars);
    }
    Ok(trimmed.to_string())
}

/// Validate and normalize a channel name.
///
/// Lowercases the trimmed input, then requires `#` followed by 1..=48 of
/// `[a-z0-9_-]`.
pub fn channel(input: &str) -> Result<String, ValidateError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidateError::Empty);
    }
    let lowered = trimmed.to_lowercase();
    if !channel_re().is_match(&lowered) {
        return Err(ValidateError::Invalid);
    }
    Ok(lowered)
}

/// Validate a message body: trimmed, non-empty, at most 2000 runes,
/// no C0 controls except TAB.
pub fn message_body(input: &str) -> Result<String, ValidateError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidateError::Empty);
    }
    if trimmed.chars().count() > BODY_MAX_RUNES {
        return Err(ValidateError::TooLong);
    }
    if trimmed.chars().any(|c| is_c0_or_del(c) && c != '\t') {
        return Err(ValidateError::ControlChars);
    }
    Ok(trimmed.to_string())
}

/// Generic text normalization: trim only, never fails.
pub fn text(input: &str) -> String {
    input.trim().to_string()
}
