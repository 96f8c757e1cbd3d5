//! Shared process-wide observability setup for the worker binaries.

pub mod tracing;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}
