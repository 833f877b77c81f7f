//! Pattern-mode search over `/ws/search-account`.
//!
//! One connection per search. The queued request is sent exactly once when
//! the connection opens; after that the connection is read-only. Every
//! inbound event goes through [`SearchSession`], and whatever snapshot it
//! returns is published on the session's `watch` channel.
//!
//! Cancellation (a newer query superseding this one) closes the connection
//! and publishes nothing further.

use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::session::SearchSession;
use crate::types::{LookupRequest, Outcome, QueryMode, Snapshot};

/// Upper bound on the close handshake. The session is already decided by
/// then; this only keeps a stalled peer from holding the task.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Drive one search to completion (or cancellation).
pub(crate) async fn run(
    url: String,
    request: LookupRequest,
    updates: watch::Sender<Snapshot>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
) {
    let started = Instant::now();
    metrics.active_streams.fetch_add(1, Relaxed);

    let mut session = SearchSession::new(QueryMode::Pattern);
    session.connect(request);
    drive(&url, &mut session, &updates, &cancel, &metrics).await;

    metrics.active_streams.fetch_sub(1, Relaxed);
    metrics.accounts.fetch_add(session.accumulated().len() as u64, Relaxed);
    metrics.malformed_messages.fetch_add(session.skipped(), Relaxed);
    metrics.search_duration.record(started.elapsed());
    debug!(
        %url,
        state = ?session.state(),
        accounts = session.accumulated().len(),
        skipped = session.skipped(),
        "search finished"
    );
}

async fn drive(
    url: &str,
    session: &mut SearchSession,
    updates: &watch::Sender<Snapshot>,
    cancel: &CancellationToken,
    metrics: &Metrics,
) {
    let publish = |snapshot: Option<Snapshot>| {
        if let Some(snapshot) = snapshot {
            if snapshot.terminal && matches!(snapshot.outcome, Some(Outcome::Failure(_))) {
                metrics.failures.fetch_add(1, Relaxed);
            }
            let _ = updates.send(snapshot);
        }
    };

    info!(%url, "connecting");

    let ws_stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(%url, "superseded while connecting");
            session.cancel();
            return;
        }
        res = connect_async_with_config(url, Some(super::ws_config()), true) => match res {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                error!(%url, error = %e, "connection failed");
                publish(session.on_transport_error());
                publish(session.on_close());
                return;
            }
        }
    };

    info!(%url, "connected");
    let (mut write, mut read) = ws_stream.split();

    if let Some(outbound) = session.on_open() {
        let sent = match serde_json::to_string(&outbound) {
            Ok(text) => write.send(Message::Text(text)).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            error!(%url, error = %e, "search request failed");
            publish(session.on_transport_error());
        }
    }

    while !session.is_closing() {
        tokio::select! {
            // Cancellation wins over frames already buffered.
            biased;
            _ = cancel.cancelled() => {
                info!(%url, "superseded, closing search");
                session.cancel();
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    metrics.stream_messages.fetch_add(1, Relaxed);
                    publish(session.on_text(&text));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(%url, ?frame, "server closed stream");
                    publish(session.on_close());
                }
                Some(Ok(_)) => {} // Binary/Ping/Pong -- ignore.
                Some(Err(e)) => {
                    warn!(%url, error = %e, "ws error");
                    publish(session.on_transport_error());
                }
                None => {
                    warn!(%url, "stream ended");
                    publish(session.on_close());
                }
            }
        }
    }

    // Best effort: the peer may already be gone.
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await;
    publish(session.on_close());
}
