//! Shared test fixtures and helpers.
//!
//! Reusable constructors for domain types used across multiple test modules,
//! so each `#[cfg(test)]` block doesn't grow its own `record()`.

use crate::directory::BankDirectory;
use crate::session::SearchSession;
use crate::types::{AccountRecord, LookupRequest, QueryMode};

/// Small directory: three banks and one non-bank institution.
pub(crate) fn directory() -> BankDirectory {
    [
        ("000014", "ACCESS BANK"),
        ("000013", "GTBANK PLC"),
        ("000015", "ZENITH BANK"),
        ("090003", "JUBILEE LIFE"),
    ]
    .into_iter()
    .collect()
}

/// Complete record at ACCESS BANK with no optional name parts.
pub(crate) fn record(account_number: &str) -> AccountRecord {
    AccountRecord {
        account_number: account_number.to_owned(),
        account_name: "JANE DOE".to_owned(),
        first_name: None,
        last_name: None,
        other_name: None,
        bank_name: "ACCESS BANK".to_owned(),
        bank_code: "000014".to_owned(),
    }
}

/// Stream frame carrying [`record`] for `account_number`.
pub(crate) fn account_frame(account_number: &str, is_final: bool) -> String {
    serde_json::json!({
        "account": record(account_number),
        "final": is_final,
    })
    .to_string()
}

/// Pattern session that has connected and flushed its request.
pub(crate) fn open_session() -> SearchSession {
    let mut session = SearchSession::new(QueryMode::Pattern);
    session.connect(LookupRequest {
        account_number: "09034*7364".to_owned(),
        bank_code: "000014".to_owned(),
        name: String::new(),
    });
    session.on_open().expect("queued request");
    session
}
