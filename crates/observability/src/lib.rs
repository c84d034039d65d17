//! Tracing/logging setup shared by the worker and tests.

/// Initialize process-wide logging with the defaults (`RUST_LOG`, JSON).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(&LoggingConfig::default());
}

pub use tracing::init_with;

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, LoggingConfig};
