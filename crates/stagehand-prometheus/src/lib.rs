//! Prometheus backend for stagehand runtime metrics.
//!
//! [`PrometheusMetrics`] implements [`stagehand_core::MetricsBackend`]; inject
//! it through a [`stagehand_core::RuntimeContext`] so the executor and every
//! sweeper report into the same registry.
//!
//! ```rust
//! use std::sync::Arc;
//! use stagehand_core::RuntimeContext;
//! use stagehand_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let ctx = RuntimeContext::default().with_metrics(Arc::new(metrics.clone()));
//!
//! // later, from whatever serves the scrape endpoint
//! let body = metrics.encode_text()?;
//! # let _ = (ctx, body);
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `stagehand_jobs_started_total{job}` - Counter
//! - `stagehand_jobs_completed_total{job, outcome}` - Counter
//! - `stagehand_job_duration_seconds{job}` - Histogram
//! - `stagehand_sweeper_missed_ticks_total{sweeper}` - Counter
//!
//! No HTTP server is bundled; expose [`PrometheusMetrics::gather`] or
//! [`PrometheusMetrics::encode_text`] from the host application.
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
