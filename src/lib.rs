//! Bank account lookup client.
//!
//! Builds a query from raw input, validates exact account numbers with one
//! HTTP call, and streams wildcard searches over a WebSocket, reducing the
//! partial results into a single outcome per search.

pub mod config;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod query;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;
