//! Query builder: raw user input → validated [`AccountQuery`].

use crate::directory::BankDirectory;
use crate::error::ValidationError;
use crate::types::{AccountQuery, MAX_IDENTIFIER_LEN, QueryMode, WILDCARD};

/// Keep only digits and wildcard markers, truncated to [`MAX_IDENTIFIER_LEN`].
///
/// Truncation is silent: the input field enforces the same limit.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == WILDCARD)
        .take(MAX_IDENTIFIER_LEN)
        .collect()
}

/// Build a query, or explain why the input cannot be sent.
///
/// Multiple wildcard markers are passed through verbatim; the server decides
/// what a pattern means.
pub fn build(
    raw_identifier: &str,
    bank_code: Option<&str>,
    holder_name: Option<&str>,
    banks: &BankDirectory,
) -> Result<AccountQuery, ValidationError> {
    if raw_identifier.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    let bank_code = match bank_code.map(str::trim) {
        Some(code) if banks.contains(code) => code,
        _ => return Err(ValidationError::NoBankSelected),
    };

    let identifier = normalize_identifier(raw_identifier);
    // Input made only of stripped characters leaves nothing to send.
    if identifier.is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }

    Ok(AccountQuery {
        mode: QueryMode::of(&identifier),
        identifier,
        bank_code: bank_code.to_owned(),
        holder_name: holder_name.filter(|n| !n.is_empty()).map(str::to_owned),
    })
}
