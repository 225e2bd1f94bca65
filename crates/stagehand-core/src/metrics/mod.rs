//! Metrics collection abstraction for the runtime.
//!
//! Backends (prometheus, statsd, ...) implement [`MetricsBackend`] and are injected via [`crate::RuntimeContext`].
mod backend;
pub use backend::{JobOutcome, MetricsBackend, MetricsHandle};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
