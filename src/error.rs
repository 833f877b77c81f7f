//! Unified error types for the account lookup client.

use thiserror::Error;

/// Input problems caught before any network call is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please enter an account number")]
    EmptyIdentifier,

    #[error("please select a bank")]
    NoBankSelected,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bank directory: {0}")]
    Directory(String),

    /// The session was replaced by a newer query before it finished.
    #[error("search superseded by a newer query")]
    Superseded,
}

pub type Result<T> = std::result::Result<T, Error>;
