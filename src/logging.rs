//! Structured logging.
//!
//! kiln only emits `tracing` events; installing a subscriber is up to the
//! binary. [`init`] is the one-liner for the common case: human-readable
//! output filtered by `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
