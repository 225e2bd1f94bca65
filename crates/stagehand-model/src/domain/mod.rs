mod constants;
pub use constants::{DEFAULT_STOP_BUDGET_MS, DEFAULT_TICK_INTERVAL_MS, MIN_SWEEP_POINTS};

mod priority;
pub use priority::Priority;

/// Interval value in milliseconds.
///
/// Used for tick periods, sweep lengths and shutdown budgets.
pub type IntervalMs = u64;
