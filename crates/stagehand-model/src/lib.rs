mod domain;
pub use domain::{DEFAULT_STOP_BUDGET_MS, DEFAULT_TICK_INTERVAL_MS, MIN_SWEEP_POINTS};
pub use domain::{IntervalMs, Priority};

mod error;
pub use error::{ModelError, ModelResult};

mod kind;
pub use kind::{JobStatus, RunnableKind};

mod strategy;
pub use strategy::InstancePolicy;

mod sweep;
pub use sweep::SweepSpec;

mod config;
pub use config::RuntimeConfig;
