//! Logging for stagehand processes.
//!
//! - [`init_logger`] installs the global `tracing` subscriber (text, JSON or journald).
//! - `subscriber` feature: loggers for executor job events and device ownership changes.
//! - `timezone-sync` feature: a job that keeps the local UTC offset current.
mod logger;
pub use logger::*;

#[cfg(feature = "subscriber")]
mod subscriber;

#[cfg(feature = "subscriber")]
pub use subscriber::*;
