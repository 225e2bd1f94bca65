use std::fmt;

use stagehand_model::RuntimeConfig;

use crate::metrics::MetricsHandle;

/// Shared context handed to the executor and every sweeper.
#[derive(Clone)]
pub struct RuntimeContext {
    config: RuntimeConfig,
    metrics: MetricsHandle,
}

impl RuntimeContext {
    /// Create a new runtime context with the given params.
    pub fn new(config: RuntimeConfig, metrics: MetricsHandle) -> Self {
        Self { config, metrics }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get a clonable handle to the metrics backend.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the metrics backend and return the updated context.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            metrics: crate::metrics::noop_metrics(),
        }
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("config", &self.config)
            .field("metrics", &"<handle>")
            .finish()
    }
}

impl fmt::Display for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuntimeContext(tick={}ms, stop_budget={}ms)",
            self.config.tick_interval_ms, self.config.stop_budget_ms
        )
    }
}
