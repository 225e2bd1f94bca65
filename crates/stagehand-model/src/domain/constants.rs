//! Runtime-wide defaults.
//!
//! Values that several crates agree on live here so the timer period, the
//! sweep resolution floor and the shutdown budget have one source of truth.

/// Period of the master tick, in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 25;

/// Smallest table a sweeper accepts.
///
/// A single point has no slope to interpolate along.
pub const MIN_SWEEP_POINTS: u32 = 2;

/// How long a shutdown waits for tracked jobs before giving up and logging.
pub const DEFAULT_STOP_BUDGET_MS: u64 = 5_000;
