//! Lightweight metrics collection with Prometheus text exposition and health endpoint.
//!
//! Histograms use 1-2.5-5 buckets from 1ms to a minute: exact lookups land
//! in the low buckets, pattern searches (which fan out server-side) in the
//! high ones. No external metrics crate; atomic counters rendered directly
//! as Prometheus text format.

use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::types::QueryMode;

// ---------------------------------------------------------------------------
// Prometheus histogram
// ---------------------------------------------------------------------------

const NUM_BUCKETS: usize = 12;

/// Upper bounds in milliseconds + Prometheus `le` label strings.
const BUCKETS: [(u64, &str); NUM_BUCKETS] = [
    (1, "0.001"),
    (5, "0.005"),
    (10, "0.01"),
    (25, "0.025"),
    (50, "0.05"),
    (100, "0.1"),
    (250, "0.25"),
    (500, "0.5"),
    (1_000, "1"),
    (5_000, "5"),
    (10_000, "10"),
    (60_000, "60"),
];

pub struct PromHistogram {
    /// Cumulative bucket counters. Index i counts observations <= BUCKETS[i].
    buckets: [AtomicU64; NUM_BUCKETS],
    sum_us: AtomicU64,
    count: AtomicU64,
}

impl Default for PromHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl PromHistogram {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a duration observation. Increments all cumulative buckets
    /// whose upper bound >= the observed value.
    pub fn record(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        if let Some(i) = BUCKETS.iter().position(|&(bound_ms, _)| millis <= bound_ms) {
            for bucket in &self.buckets[i..] {
                bucket.fetch_add(1, Relaxed);
            }
        }

        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.sum_us.fetch_add(micros, Relaxed);
        self.count.fetch_add(1, Relaxed);
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Relaxed)
    }

    fn render(&self, name: &str, out: &mut String) {
        for (i, &(_, le)) in BUCKETS.iter().enumerate() {
            let count = self.buckets[i].load(Relaxed);
            writeln!(out, "{name}_bucket{{le=\"{le}\"}} {count}").unwrap();
        }
        let total = self.count.load(Relaxed);
        writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {total}").unwrap();

        let sum_secs = self.sum_us.load(Relaxed) as f64 / 1_000_000.0;
        writeln!(out, "{name}_sum {sum_secs}").unwrap();
        writeln!(out, "{name}_count {total}").unwrap();
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

pub struct Metrics {
    // Counters
    pub exact_sessions: AtomicU64,
    pub pattern_sessions: AtomicU64,
    pub superseded: AtomicU64,
    pub stream_messages: AtomicU64,
    pub malformed_messages: AtomicU64,
    pub accounts: AtomicU64,
    pub failures: AtomicU64,

    // Gauges
    pub active_streams: AtomicU64,
    start_time: Instant,

    // Latency histograms
    pub lookup_latency: PromHistogram,
    pub search_duration: PromHistogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            exact_sessions: AtomicU64::new(0),
            pattern_sessions: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            stream_messages: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            accounts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            start_time: Instant::now(),
            lookup_latency: PromHistogram::new(),
            search_duration: PromHistogram::new(),
        }
    }
}

impl Metrics {
    pub fn session_started(&self, mode: QueryMode) {
        match mode {
            QueryMode::Exact => self.exact_sessions.fetch_add(1, Relaxed),
            QueryMode::Pattern => self.pattern_sessions.fetch_add(1, Relaxed),
        };
    }

    /// Render all metrics in Prometheus text exposition format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        // -- Counters --
        writeln!(out, "# HELP account_lookup_sessions_total Queries dispatched").unwrap();
        writeln!(out, "# TYPE account_lookup_sessions_total counter").unwrap();
        writeln!(out, "account_lookup_sessions_total{{mode=\"exact\"}} {}", self.exact_sessions.load(Relaxed)).unwrap();
        writeln!(out, "account_lookup_sessions_total{{mode=\"pattern\"}} {}", self.pattern_sessions.load(Relaxed)).unwrap();

        writeln!(out, "# HELP account_lookup_superseded_total Searches closed early by a newer query").unwrap();
        writeln!(out, "# TYPE account_lookup_superseded_total counter").unwrap();
        writeln!(out, "account_lookup_superseded_total {}", self.superseded.load(Relaxed)).unwrap();

        writeln!(out, "# HELP account_lookup_stream_messages_total WebSocket text frames received").unwrap();
        writeln!(out, "# TYPE account_lookup_stream_messages_total counter").unwrap();
        writeln!(out, "account_lookup_stream_messages_total {}", self.stream_messages.load(Relaxed)).unwrap();

        writeln!(out, "# HELP account_lookup_malformed_messages_total Frames or records skipped as malformed").unwrap();
        writeln!(out, "# TYPE account_lookup_malformed_messages_total counter").unwrap();
        writeln!(out, "account_lookup_malformed_messages_total {}", self.malformed_messages.load(Relaxed)).unwrap();

        writeln!(out, "# HELP account_lookup_accounts_total Account records received").unwrap();
        writeln!(out, "# TYPE account_lookup_accounts_total counter").unwrap();
        writeln!(out, "account_lookup_accounts_total {}", self.accounts.load(Relaxed)).unwrap();

        writeln!(out, "# HELP account_lookup_failures_total Sessions that ended in failure").unwrap();
        writeln!(out, "# TYPE account_lookup_failures_total counter").unwrap();
        writeln!(out, "account_lookup_failures_total {}", self.failures.load(Relaxed)).unwrap();

        // -- Gauges --
        writeln!(out, "# HELP account_lookup_stream_active Open search streams").unwrap();
        writeln!(out, "# TYPE account_lookup_stream_active gauge").unwrap();
        writeln!(out, "account_lookup_stream_active {}", self.active_streams.load(Relaxed)).unwrap();

        writeln!(out, "# HELP account_lookup_uptime_seconds Seconds since process start").unwrap();
        writeln!(out, "# TYPE account_lookup_uptime_seconds gauge").unwrap();
        writeln!(out, "account_lookup_uptime_seconds {}", self.start_time.elapsed().as_secs()).unwrap();

        // -- Histograms --
        writeln!(out, "# HELP account_lookup_lookup_duration_seconds Exact lookup round trip").unwrap();
        writeln!(out, "# TYPE account_lookup_lookup_duration_seconds histogram").unwrap();
        self.lookup_latency.render("account_lookup_lookup_duration_seconds", &mut out);

        writeln!(out, "# HELP account_lookup_search_duration_seconds Pattern search connect to close").unwrap();
        writeln!(out, "# TYPE account_lookup_search_duration_seconds histogram").unwrap();
        self.search_duration.render("account_lookup_search_duration_seconds", &mut out);

        out
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

/// Serve `/health` and `/metrics` on the given port until `cancel` fires.
pub async fn serve_http(port: u16, metrics: Arc<Metrics>, cancel: CancellationToken) {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prom_metrics))
        .with_state(metrics);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port, error = %e, "failed to bind metrics port");
            return;
        }
    };

    info!(port, "metrics/health HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .ok();
}

async fn health() -> &'static str {
    "OK\n"
}

async fn prom_metrics(State(m): State<Arc<Metrics>>) -> String {
    m.to_prometheus()
}
