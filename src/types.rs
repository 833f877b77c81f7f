//! Core domain types for account lookups.
//!
//! Wire structs mirror the validation service's JSON exactly; domain types
//! (`AccountRecord`, `Outcome`, `Snapshot`) are what the rest of the crate
//! and its consumers work with.

use serde::{Deserialize, Serialize};

/// Character that stands for "any digit" in an account identifier.
pub const WILDCARD: char = '*';

/// Maximum length of a normalized account identifier.
pub const MAX_IDENTIFIER_LEN: usize = 10;

/// Exact lookups go over HTTP; pattern searches stream over WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Exact,
    Pattern,
}

impl QueryMode {
    /// Pattern iff the identifier contains the wildcard marker.
    #[must_use]
    pub fn of(identifier: &str) -> Self {
        if identifier.contains(WILDCARD) {
            Self::Pattern
        } else {
            Self::Exact
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Pattern => "pattern",
        }
    }
}

/// A validated, normalized query ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountQuery {
    /// Digits and wildcard markers only, at most [`MAX_IDENTIFIER_LEN`] chars.
    pub identifier: String,
    /// Known to exist in the bank directory at build time.
    pub bank_code: String,
    pub holder_name: Option<String>,
    pub mode: QueryMode,
}

impl AccountQuery {
    /// Outbound payload shared by both transports.
    #[must_use]
    pub fn to_request(&self) -> LookupRequest {
        LookupRequest {
            account_number: self.identifier.clone(),
            bank_code: self.bank_code.clone(),
            name: self.holder_name.clone().unwrap_or_default(),
        }
    }
}

/// One account as reported by the server. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_number: String,
    pub account_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_name: Option<String>,
    pub bank_name: String,
    pub bank_code: String,
}

/// Externally visible reduction of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(AccountRecord),
    SuccessMany(Vec<AccountRecord>),
    Empty,
    Failure(String),
}

impl Outcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Records carried by this outcome, in arrival order.
    #[must_use]
    pub fn records(&self) -> &[AccountRecord] {
        match self {
            Self::Success(record) => std::slice::from_ref(record),
            Self::SuccessMany(records) => records,
            Self::Empty | Self::Failure(_) => &[],
        }
    }
}

/// Transport lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// What a consumer sees of a session at a point in time.
///
/// `Snapshot::default()` is the loading state. A snapshot with
/// `terminal == true` is the last one a session ever publishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub outcome: Option<Outcome>,
    pub terminal: bool,
}

impl Snapshot {
    #[must_use]
    pub fn partial(records: Vec<AccountRecord>) -> Self {
        Self {
            outcome: Some(Outcome::SuccessMany(records)),
            terminal: false,
        }
    }

    #[must_use]
    pub fn terminal(outcome: Outcome) -> Self {
        Self {
            outcome: Some(outcome),
            terminal: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Body of `POST /api/validate-account` and the single WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRequest {
    pub account_number: String,
    pub bank_code: String,
    pub name: String,
}

/// Response of `POST /api/validate-account`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateResponse {
    #[serde(rename = "isValid", default)]
    pub is_valid: bool,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub other_name: Option<String>,
    pub bank_name: Option<String>,
    pub bank_code: Option<String>,
    pub message: Option<String>,
}

/// One inbound frame on `/ws/search-account`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMessage {
    /// Raw account payload, decoded on its own so a mistyped account can't
    /// take `final` and `error` down with it.
    #[serde(default)]
    pub account: Option<serde_json::Value>,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamMessage {
    /// Server error text, if any. Empty strings do not count.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Account fields as they arrive on the wire; any of them may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialAccount {
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub other_name: Option<String>,
    pub bank_name: Option<String>,
    pub bank_code: Option<String>,
}

impl PartialAccount {
    /// Complete record from a raw `account` payload. Wrong JSON types and
    /// missing fields both give `None`.
    #[must_use]
    pub fn decode(value: serde_json::Value) -> Option<AccountRecord> {
        serde_json::from_value::<Self>(value).ok()?.into_record()
    }

    /// Complete record iff every required field is present and non-empty.
    #[must_use]
    pub fn into_record(self) -> Option<AccountRecord> {
        let required = |field: Option<String>| field.filter(|v| !v.is_empty());
        Some(AccountRecord {
            account_number: required(self.account_number)?,
            account_name: required(self.account_name)?,
            first_name: self.first_name,
            last_name: self.last_name,
            other_name: self.other_name,
            bank_name: required(self.bank_name)?,
            bank_code: required(self.bank_code)?,
        })
    }
}

impl ValidateResponse {
    /// Record built from a valid response; `None` if required fields are missing.
    #[must_use]
    pub fn into_record(self) -> Option<AccountRecord> {
        PartialAccount {
            account_number: self.account_number,
            account_name: self.account_name,
            first_name: self.first_name,
            last_name: self.last_name,
            other_name: self.other_name,
            bank_name: self.bank_name,
            bank_code: self.bank_code,
        }
        .into_record()
    }
}
