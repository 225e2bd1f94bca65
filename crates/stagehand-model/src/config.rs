use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_STOP_BUDGET_MS, DEFAULT_TICK_INTERVAL_MS, IntervalMs, Priority};
use crate::error::ModelResult;
use crate::sweep::SweepSpec;

/// Process-level runtime settings.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Period of the master tick.
    pub tick_interval_ms: IntervalMs,
    /// Budget `wait_to_stop` gets during shutdown.
    pub stop_budget_ms: IntervalMs,
    /// Priority used for claims that do not name one.
    pub default_priority: Priority,
    /// Default sweep for effects that do not bring their own.
    pub sweep: SweepSpec,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            stop_budget_ms: DEFAULT_STOP_BUDGET_MS,
            default_priority: Priority::default(),
            sweep: SweepSpec::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(crate::ModelError::OutOfRange(
                "tickIntervalMs must be greater than zero".into(),
            ));
        }
        self.sweep.validate()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stop_budget(&self) -> Duration {
        Duration::from_millis(self.stop_budget_ms)
    }
}
