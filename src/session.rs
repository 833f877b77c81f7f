//! Search session state machine.
//!
//! A [`SearchSession`] owns the lifecycle of one dispatched query and reduces
//! transport events into [`Snapshot`]s for the consumer. It does no I/O: the
//! drivers in [`crate::transport`] feed it events (`on_open`, `on_text`,
//! `on_transport_error`, `on_close`) and publish whatever it returns.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──on_open──▶ Open ──final/error──▶ Closing ──on_close──▶ Closed
//!   │                                        │ ▲
//!   └──resolve (exact mode)──▶ Closed        └─┘ account: append + publish partial
//! ```
//!
//! `terminal` flips exactly once. After that every event is ignored and no
//! snapshot is ever returned again, so a late error or close callback can't
//! override an outcome the consumer has already seen.

use tracing::{debug, warn};

use crate::types::{
    AccountRecord, ConnectionState, LookupRequest, Outcome, PartialAccount, QueryMode, Snapshot,
    StreamMessage,
};

/// Outcome text when a stream finishes without a single match.
pub const NO_MATCHES: &str = "no matching accounts found";

/// Outcome text for transport-level failures on the stream.
pub const CONNECTION_ERROR: &str = "connection error occurred";

#[derive(Debug)]
pub struct SearchSession {
    mode: QueryMode,
    /// Arrival order.
    accumulated: Vec<AccountRecord>,
    state: ConnectionState,
    terminal: bool,
    /// Set together with `terminal`, or on cancel. Inbound events are
    /// ignored from here on.
    closing: bool,
    last_error: Option<String>,
    /// The single outbound message, flushed on `Connecting -> Open`.
    queued_outbound: Option<LookupRequest>,
    /// Frames or records dropped as malformed.
    skipped: u64,
}

impl SearchSession {
    #[must_use]
    pub fn new(mode: QueryMode) -> Self {
        Self {
            mode,
            accumulated: Vec::new(),
            state: ConnectionState::Idle,
            terminal: false,
            closing: false,
            last_error: None,
            queued_outbound: None,
            skipped: 0,
        }
    }

    #[must_use]
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    #[must_use]
    pub fn accumulated(&self) -> &[AccountRecord] {
        &self.accumulated
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// `Idle -> Connecting`, queueing the message to send once open.
    pub fn connect(&mut self, outbound: LookupRequest) {
        if self.state == ConnectionState::Idle && !self.closing {
            self.state = ConnectionState::Connecting;
            self.queued_outbound = Some(outbound);
        }
    }

    /// `Connecting -> Open`. Returns the queued message the first time only.
    pub fn on_open(&mut self) -> Option<LookupRequest> {
        if self.closing || self.state != ConnectionState::Connecting {
            return None;
        }
        self.state = ConnectionState::Open;
        self.queued_outbound.take()
    }

    /// Decode and apply one text frame. Undecodable frames are skipped.
    pub fn on_text(&mut self, text: &str) -> Option<Snapshot> {
        if !self.accepts_messages() {
            return None;
        }
        match serde_json::from_str::<StreamMessage>(text) {
            Ok(message) => self.on_message(message),
            Err(e) => {
                self.skipped += 1;
                warn!(
                    error = %e,
                    payload_head = head(text, 200),
                    "undecodable stream message"
                );
                None
            }
        }
    }

    /// Apply one decoded stream message.
    pub fn on_message(&mut self, message: StreamMessage) -> Option<Snapshot> {
        if !self.accepts_messages() {
            return None;
        }

        if let Some(error) = message.error() {
            // Error overrides anything accumulated so far.
            debug!(error, accumulated = self.accumulated.len(), "server reported error");
            self.last_error = Some(error.to_owned());
            return Some(self.finish(Outcome::Failure(error.to_owned())));
        }

        let mut appended = false;
        if let Some(account) = message.account {
            match PartialAccount::decode(account) {
                Some(record) => {
                    debug!(account = %record.account_number, "account received");
                    self.accumulated.push(record);
                    appended = true;
                }
                None => {
                    self.skipped += 1;
                    warn!("account missing required fields, skipped");
                }
            }
        }

        if message.is_final {
            let outcome = if self.accumulated.is_empty() {
                self.last_error = Some(NO_MATCHES.to_owned());
                Outcome::Failure(NO_MATCHES.to_owned())
            } else {
                Outcome::SuccessMany(self.accumulated.clone())
            };
            return Some(self.finish(outcome));
        }

        appended.then(|| Snapshot::partial(self.accumulated.clone()))
    }

    /// Transport error (connect failure, read/write error).
    pub fn on_transport_error(&mut self) -> Option<Snapshot> {
        if self.closing {
            return None;
        }
        self.last_error = Some(CONNECTION_ERROR.to_owned());
        Some(self.finish(Outcome::Failure(CONNECTION_ERROR.to_owned())))
    }

    /// Transport closed. Unexpected closes end the session with whatever was
    /// already accumulated, without inventing an error.
    pub fn on_close(&mut self) -> Option<Snapshot> {
        self.state = ConnectionState::Closed;
        if self.closing {
            return None;
        }
        self.closing = true;
        self.terminal = true;
        let outcome = if self.accumulated.is_empty() {
            Outcome::Empty
        } else {
            Outcome::SuccessMany(self.accumulated.clone())
        };
        Some(Snapshot::terminal(outcome))
    }

    /// Resolve an exact-mode session from its single response.
    pub fn resolve(&mut self, outcome: Outcome) -> Option<Snapshot> {
        if self.closing {
            return None;
        }
        if let Outcome::Failure(reason) = &outcome {
            self.last_error = Some(reason.clone());
        }
        let snapshot = self.finish(outcome);
        self.state = ConnectionState::Closed;
        Some(snapshot)
    }

    /// Abandon the session because a newer query replaced it. Nothing is
    /// published for a cancelled session.
    pub fn cancel(&mut self) {
        if !self.closing {
            self.closing = true;
            self.terminal = true;
            if self.state != ConnectionState::Closed {
                self.state = ConnectionState::Closing;
            }
        }
    }

    fn accepts_messages(&self) -> bool {
        !self.closing && self.state == ConnectionState::Open
    }

    fn finish(&mut self, outcome: Outcome) -> Snapshot {
        self.terminal = true;
        self.closing = true;
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closing;
        }
        Snapshot::terminal(outcome)
    }
}

/// First `n` chars of `text`, for logging.
fn head(text: &str, n: usize) -> &str {
    text.char_indices().nth(n).map_or(text, |(i, _)| &text[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{account_frame, open_session, record};

    const FINAL: &str = r#"{"final":true}"#;

    #[test]
    fn outbound_flushed_once_on_open() {
        let mut session = SearchSession::new(QueryMode::Pattern);
        assert_eq!(session.state(), ConnectionState::Idle);

        // Not connecting yet: nothing to flush.
        assert!(session.on_open().is_none());

        let request = LookupRequest {
            account_number: "09034*7364".into(),
            bank_code: "000014".into(),
            name: String::new(),
        };
        session.connect(request.clone());
        assert_eq!(session.state(), ConnectionState::Connecting);

        assert_eq!(session.on_open(), Some(request));
        assert_eq!(session.state(), ConnectionState::Open);
        assert!(session.on_open().is_none());
    }

    #[test]
    fn messages_before_open_are_ignored() {
        let mut session = SearchSession::new(QueryMode::Pattern);
        session.connect(LookupRequest {
            account_number: "0*".into(),
            bank_code: "000014".into(),
            name: String::new(),
        });
        assert!(session.on_text(&account_frame("0123456789", false)).is_none());
        assert!(session.accumulated().is_empty());
    }

    #[test]
    fn multiple_matches_then_final() {
        let mut session = open_session();

        let first = session.on_text(&account_frame("0903417364", false)).expect("partial");
        assert_eq!(first, Snapshot::partial(vec![record("0903417364")]));

        let second = session.on_text(&account_frame("0903427364", false)).expect("partial");
        assert_eq!(
            second,
            Snapshot::partial(vec![record("0903417364"), record("0903427364")])
        );

        let done = session.on_text(FINAL).expect("terminal");
        assert_eq!(
            done,
            Snapshot::terminal(Outcome::SuccessMany(vec![
                record("0903417364"),
                record("0903427364"),
            ]))
        );
        assert!(session.is_terminal());
        assert_eq!(session.state(), ConnectionState::Closing);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn account_on_the_final_frame_counts() {
        let mut session = open_session();
        let done = session.on_text(&account_frame("0903417364", true)).expect("terminal");
        assert_eq!(
            done,
            Snapshot::terminal(Outcome::SuccessMany(vec![record("0903417364")]))
        );
    }

    #[test]
    fn final_without_matches_is_failure() {
        let mut session = open_session();
        let done = session.on_text(FINAL).expect("terminal");
        assert_eq!(done, Snapshot::terminal(Outcome::Failure(NO_MATCHES.into())));
        assert_eq!(session.last_error(), Some(NO_MATCHES));
    }

    #[test]
    fn error_overrides_partial_results() {
        let mut session = open_session();
        session.on_text(&account_frame("0903417364", false)).expect("partial");

        let done = session
            .on_text(r#"{"final":false,"error":"upstream quota exhausted"}"#)
            .expect("terminal");
        assert_eq!(
            done,
            Snapshot::terminal(Outcome::Failure("upstream quota exhausted".into()))
        );
        assert!(session.is_closing());
        assert_eq!(session.last_error(), Some("upstream quota exhausted"));
    }

    #[test]
    fn malformed_account_is_skipped() {
        let mut session = open_session();
        session.on_text(&account_frame("0903417364", false)).expect("partial");

        let missing_code = r#"{"account":{"account_number":"0903427364","account_name":"JOHN DOE","bank_name":"ACCESS BANK"},"final":false}"#;
        assert!(session.on_text(missing_code).is_none());
        assert_eq!(session.accumulated(), &[record("0903417364")]);
        assert_eq!(session.skipped(), 1);
        assert!(!session.is_terminal());
    }

    #[test]
    fn malformed_account_on_final_frame_still_finishes() {
        let mut session = open_session();
        let done = session
            .on_text(r#"{"account":{"account_number":"0903427364"},"final":true}"#)
            .expect("terminal");
        assert_eq!(done, Snapshot::terminal(Outcome::Failure(NO_MATCHES.into())));
    }

    #[test]
    fn mistyped_account_on_final_frame_still_finishes() {
        let mut session = open_session();
        session.on_text(&account_frame("0903417364", false)).expect("partial");

        let done = session
            .on_text(r#"{"account":{"account_number":"0903427364","bank_code":14},"final":true}"#)
            .expect("terminal");
        assert_eq!(
            done,
            Snapshot::terminal(Outcome::SuccessMany(vec![record("0903417364")]))
        );
        assert!(session.is_terminal());
        assert_eq!(session.skipped(), 1);
    }

    #[test]
    fn mistyped_account_with_error_still_fails() {
        let mut session = open_session();
        let done = session
            .on_text(r#"{"account":"garbage","error":"Search timed out after 300 seconds","final":true}"#)
            .expect("terminal");
        assert_eq!(
            done,
            Snapshot::terminal(Outcome::Failure("Search timed out after 300 seconds".into()))
        );
        assert_eq!(session.last_error(), Some("Search timed out after 300 seconds"));
    }

    #[test]
    fn mistyped_account_mid_stream_is_skipped() {
        let mut session = open_session();
        assert!(session.on_text(r#"{"account":[1,2,3],"final":false}"#).is_none());
        assert_eq!(session.skipped(), 1);
        assert!(!session.is_terminal());
    }

    #[test]
    fn undecodable_frame_is_skipped() {
        let mut session = open_session();
        assert!(session.on_text("not json").is_none());
        assert!(session.on_text(r#"{"final":"yes"}"#).is_none());
        assert_eq!(session.skipped(), 2);
        assert!(!session.is_terminal());
    }

    #[test]
    fn nothing_published_after_terminal() {
        let mut session = open_session();
        session.on_text(FINAL).expect("terminal");

        // Racing callbacks after the decisive frame.
        assert!(session.on_text(&account_frame("0903417364", false)).is_none());
        assert!(session.on_text(r#"{"final":true,"error":"late"}"#).is_none());
        assert!(session.on_transport_error().is_none());
        assert!(session.on_close().is_none());

        assert!(session.accumulated().is_empty());
        assert_eq!(session.last_error(), Some(NO_MATCHES));
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[test]
    fn transport_error_is_terminal() {
        let mut session = open_session();
        session.on_text(&account_frame("0903417364", false)).expect("partial");

        let done = session.on_transport_error().expect("terminal");
        assert_eq!(done, Snapshot::terminal(Outcome::Failure(CONNECTION_ERROR.into())));
        assert!(session.on_close().is_none());
    }

    #[test]
    fn transport_error_while_connecting() {
        let mut session = SearchSession::new(QueryMode::Pattern);
        session.connect(LookupRequest {
            account_number: "0*".into(),
            bank_code: "000014".into(),
            name: String::new(),
        });
        let done = session.on_transport_error().expect("terminal");
        assert_eq!(done.outcome, Some(Outcome::Failure(CONNECTION_ERROR.into())));
        // Late open after failure sends nothing.
        assert!(session.on_open().is_none());
    }

    #[test]
    fn unexpected_close_keeps_existing_result() {
        let mut session = open_session();
        session.on_text(&account_frame("0903417364", false)).expect("partial");

        let done = session.on_close().expect("terminal");
        assert_eq!(
            done,
            Snapshot::terminal(Outcome::SuccessMany(vec![record("0903417364")]))
        );
        assert_eq!(session.last_error(), None);
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[test]
    fn unexpected_close_with_nothing_is_empty() {
        let mut session = open_session();
        let done = session.on_close().expect("terminal");
        assert_eq!(done, Snapshot::terminal(Outcome::Empty));
    }

    #[test]
    fn cancelled_session_publishes_nothing() {
        let mut session = open_session();
        session.on_text(&account_frame("0903417364", false)).expect("partial");
        session.cancel();

        assert!(session.on_text(FINAL).is_none());
        assert!(session.on_transport_error().is_none());
        assert!(session.on_close().is_none());
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[test]
    fn exact_resolution_bypasses_connection_states() {
        let mut session = SearchSession::new(QueryMode::Exact);
        let done = session
            .resolve(Outcome::Success(record("0123456789")))
            .expect("terminal");
        assert_eq!(done, Snapshot::terminal(Outcome::Success(record("0123456789"))));
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.resolve(Outcome::Empty).is_none());
    }

    #[test]
    fn exact_failure_records_reason() {
        let mut session = SearchSession::new(QueryMode::Exact);
        session.resolve(Outcome::Failure("Account not found".into()));
        assert_eq!(session.last_error(), Some("Account not found"));
    }

    #[test]
    fn partial_sequence_grows_in_arrival_order() {
        let mut session = open_session();
        let numbers = ["0903407364", "0903487364", "0903417364", "0903497364"];
        let mut last_len = 0;
        for number in numbers {
            let snapshot = session.on_text(&account_frame(number, false)).expect("partial");
            let records = snapshot.outcome.expect("outcome");
            let records = records.records();
            assert_eq!(records.len(), last_len + 1);
            assert_eq!(records.last().map(|r| r.account_number.as_str()), Some(number));
            last_len = records.len();
        }
    }
}
