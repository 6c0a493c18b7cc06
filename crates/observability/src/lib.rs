//! Tracing/logging setup shared by tests, benches, and downstream binaries.
//!
//! The library crates only emit `tracing` events; installing a subscriber is
//! the embedder's job. This crate is the one-liner for processes that don't
//! want to configure layers themselves.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Filtering comes from `RUST_LOG`, defaulting to `info`. Safe to call
/// multiple times; subsequent calls become no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
