//! Tracing Setup
//!
//! Structured logging via `tracing-subscriber` with an env-filter. Log
//! level comes from `RUST_LOG` (default: info).

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Safe to call once at startup; subsequent calls are ignored so tests
/// can initialize independently.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
