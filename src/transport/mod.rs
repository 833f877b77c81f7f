//! Transport selection and the single active-session slot.
//!
//! Exact queries are answered by one HTTP round trip ([`http`]); pattern
//! queries stream over a WebSocket ([`stream`]). [`Dispatcher`] owns at most
//! one running search: dispatching a new query first closes the previous
//! connection and waits for its task to exit, so a superseded search can
//! never publish after its replacement starts.

pub mod http;
pub(crate) mod stream;

use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::session::SearchSession;
use crate::types::{AccountQuery, Outcome, QueryMode, Snapshot};

/// TCP connect bound for exact lookups. Unreachable hosts surface as a
/// transport failure instead of hanging the caller.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Host alias the Android emulator uses for the host machine's loopback.
pub const EMULATOR_HOST: &str = "10.0.2.2";

/// WebSocket config: flush every frame immediately.
pub fn ws_config() -> tokio_tungstenite::tungstenite::protocol::WebSocketConfig {
    tokio_tungstenite::tungstenite::protocol::WebSocketConfig {
        write_buffer_size: 0,
        ..Default::default()
    }
}

// ── Endpoints ───────────────────────────────────────────────────────────────

/// Where both transports point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    host: String,
    port: u16,
    secure: bool,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new("localhost", 8080, false, false)
    }
}

impl Endpoints {
    /// `emulator` rewrites loopback hosts to [`EMULATOR_HOST`]; any other
    /// host is used as given.
    #[must_use]
    pub fn new(host: &str, port: u16, secure: bool, emulator: bool) -> Self {
        let host = if emulator && matches!(host, "localhost" | "127.0.0.1") {
            EMULATOR_HOST
        } else {
            host
        };
        Self {
            host: host.to_owned(),
            port,
            secure,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn validate_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}/api/validate-account", self.host, self.port)
    }

    #[must_use]
    pub fn search_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/ws/search-account", self.host, self.port)
    }
}

// ── Consumer handle ─────────────────────────────────────────────────────────

/// Consumer side of one dispatched query.
#[derive(Debug)]
pub struct SearchHandle {
    mode: QueryMode,
    updates: watch::Receiver<Snapshot>,
}

impl SearchHandle {
    #[must_use]
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Latest snapshot, marking it seen.
    pub fn snapshot(&mut self) -> Snapshot {
        self.updates.borrow_and_update().clone()
    }

    /// Wait for an unseen snapshot. `false` once the session is gone and
    /// everything it published has been seen.
    pub async fn changed(&mut self) -> bool {
        self.updates.changed().await.is_ok()
    }

    /// Wait for the terminal outcome.
    ///
    /// Returns [`Error::Superseded`] if a newer query closed this session
    /// before it finished.
    pub async fn outcome(mut self) -> Result<Outcome> {
        loop {
            let snapshot = self.snapshot();
            if snapshot.terminal {
                return snapshot.outcome.ok_or(Error::Superseded);
            }
            if !self.changed().await {
                return Err(Error::Superseded);
            }
        }
    }

    /// Every snapshot from now on, starting with the current one.
    #[must_use]
    pub fn updates(self) -> WatchStream<Snapshot> {
        WatchStream::new(self.updates)
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────────────

struct ActiveSearch {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    /// Observer of the session's own channel, to tell a finished search
    /// from one cut short.
    updates: watch::Receiver<Snapshot>,
}

/// Chooses a transport per query and enforces one running search at a time.
pub struct Dispatcher {
    endpoints: Endpoints,
    client: Client,
    metrics: Arc<Metrics>,
    active: Option<ActiveSearch>,
}

impl Dispatcher {
    pub fn new(endpoints: Endpoints, metrics: Arc<Metrics>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoints,
            client,
            metrics,
            active: None,
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Start a query, superseding any search still running.
    ///
    /// Exact queries are awaited here and come back already terminal.
    /// Pattern queries return immediately; results arrive on the handle.
    pub async fn dispatch(&mut self, query: &AccountQuery) -> SearchHandle {
        self.close().await;
        self.metrics.session_started(query.mode);

        let (tx, rx) = watch::channel(Snapshot::default());
        let request = query.to_request();

        match query.mode {
            QueryMode::Exact => {
                let url = self.endpoints.validate_url();
                let mut session = SearchSession::new(QueryMode::Exact);

                let t0 = Instant::now();
                let outcome = http::lookup(&self.client, &url, &request).await;
                self.metrics.lookup_latency.record(t0.elapsed());

                if outcome.is_failure() {
                    self.metrics.failures.fetch_add(1, Relaxed);
                } else {
                    self.metrics
                        .accounts
                        .fetch_add(outcome.records().len() as u64, Relaxed);
                }
                if let Some(snapshot) = session.resolve(outcome) {
                    let _ = tx.send(snapshot);
                }
            }
            QueryMode::Pattern => {
                let cancel = CancellationToken::new();
                let updates = rx.clone();
                let task = tokio::spawn(stream::run(
                    self.endpoints.search_url(),
                    request,
                    tx,
                    cancel.clone(),
                    Arc::clone(&self.metrics),
                ));
                self.active = Some(ActiveSearch {
                    cancel,
                    task,
                    updates,
                });
            }
        }

        SearchHandle {
            mode: query.mode,
            updates: rx,
        }
    }

    /// Close the running search, if any, and wait until it can no longer
    /// publish. Safe to call repeatedly.
    pub async fn close(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if active.updates.borrow().terminal {
            debug!("previous search already finished");
        } else {
            info!("closing previous search");
            self.metrics.superseded.fetch_add(1, Relaxed);
        }
        active.cancel.cancel();
        let _ = active.task.await;
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}
