//! Tracing/logging initialization.
//!
//! JSON-structured logs so cycle stats and audit records land in the log
//! pipeline as fields rather than prose. Filtering via `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for a worker process.
///
/// Defaults to `info` when `RUST_LOG` is unset. Safe to call multiple
/// times; only the first call installs the subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
