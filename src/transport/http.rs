//! Exact-mode lookup: one `POST /api/validate-account`, one response.

use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::{debug, warn};

use crate::types::{LookupRequest, Outcome, ValidateResponse};

/// Outcome when no response was received at all.
pub const CONNECT_FAILED: &str = "failed to connect to server";

/// Outcome for `isValid: false` without a server message.
pub const VALIDATION_FAILED: &str = "validation failed";

/// Outcome for a 2xx response that can't be turned into a record.
pub const MALFORMED_RESPONSE: &str = "malformed response from server";

/// Run one exact lookup. Every failure becomes [`Outcome::Failure`]; nothing
/// is retried.
pub async fn lookup(client: &Client, url: &str, request: &LookupRequest) -> Outcome {
    debug!(%url, account = %request.account_number, bank = %request.bank_code, "validating account");

    let response = match client
        .post(url)
        .header(ACCEPT, "application/json")
        .json(request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(%url, error = %e, "validation request failed");
            return Outcome::Failure(CONNECT_FAILED.to_owned());
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(%url, status = status.as_u16(), "validation service returned error status");
        let reason = match status.canonical_reason() {
            Some(reason) => format!("Server error: {} {reason}", status.as_u16()),
            None => format!("Server error: {}", status.as_u16()),
        };
        return Outcome::Failure(reason);
    }

    let body: ValidateResponse = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            warn!(%url, error = %e, "undecodable validation response");
            return Outcome::Failure(MALFORMED_RESPONSE.to_owned());
        }
    };

    into_outcome(body)
}

/// Reduce a decoded response body.
#[must_use]
pub fn into_outcome(body: ValidateResponse) -> Outcome {
    if !body.is_valid {
        let message = body
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| VALIDATION_FAILED.to_owned());
        return Outcome::Failure(message);
    }
    match body.into_record() {
        Some(record) => Outcome::Success(record),
        None => {
            warn!("valid response missing required account fields");
            Outcome::Failure(MALFORMED_RESPONSE.to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountRecord;

    fn parse(json: &str) -> Outcome {
        into_outcome(serde_json::from_str(json).expect("valid JSON"))
    }

    #[test]
    fn valid_response_is_success() {
        let outcome = parse(
            r#"{"isValid":true,"account_number":"0123456789","account_name":"JANE DOE",
                "first_name":"JANE","last_name":"DOE","bank_name":"ACCESS BANK","bank_code":"000014"}"#,
        );
        assert_eq!(
            outcome,
            Outcome::Success(AccountRecord {
                account_number: "0123456789".into(),
                account_name: "JANE DOE".into(),
                first_name: Some("JANE".into()),
                last_name: Some("DOE".into()),
                other_name: None,
                bank_name: "ACCESS BANK".into(),
                bank_code: "000014".into(),
            })
        );
    }

    #[test]
    fn invalid_response_carries_message() {
        let outcome = parse(r#"{"isValid":false,"message":"Account not found"}"#);
        assert_eq!(outcome, Outcome::Failure("Account not found".into()));
    }

    #[test]
    fn invalid_response_without_message() {
        assert_eq!(
            parse(r#"{"isValid":false}"#),
            Outcome::Failure(VALIDATION_FAILED.into())
        );
        assert_eq!(
            parse(r#"{"isValid":false,"message":""}"#),
            Outcome::Failure(VALIDATION_FAILED.into())
        );
    }

    #[test]
    fn valid_but_incomplete_is_malformed() {
        let outcome = parse(r#"{"isValid":true,"account_number":"0123456789"}"#);
        assert_eq!(outcome, Outcome::Failure(MALFORMED_RESPONSE.into()));
    }

    #[test]
    fn missing_is_valid_means_invalid() {
        let outcome = parse(r#"{"error":"Invalid request format"}"#);
        assert_eq!(outcome, Outcome::Failure(VALIDATION_FAILED.into()));
    }
}
