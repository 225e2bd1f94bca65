//! Kinds of things an [`Executor`](crate::executor::Executor) manages.
use std::sync::Arc;

use stagehand_model::RunnableKind;

use crate::cell::BroadcastCell;

/// Component with an explicit start/stop lifecycle.
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    /// Start-order bucket. Other by default.
    fn kind(&self) -> RunnableKind {
        RunnableKind::Other
    }

    fn start(&self);

    fn stop(&self);

    /// Final cleanup after every runnable has stopped.
    fn dispose(&self) {}
}

/// Controllable hardware output.
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// Push the device's resting value.
    fn set_initial_state(&self);

    /// Called after output hardware has started.
    fn enable_output(&self) {}

    /// Power switch forced off on stop, if the device has one.
    fn master_power(&self) -> Option<&BroadcastCell<bool>> {
        None
    }
}

pub trait Effect: Send + Sync {
    fn name(&self) -> &str;

    fn stop(&self);
}

/// A show segment; `run` is expected to hand work to the executor and return.
pub trait Scene: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self);

    fn stop(&self);
}

/// Anything that can be registered with an executor.
#[derive(Clone)]
pub enum Entity {
    Runnable(Arc<dyn Runnable>),
    Device(Arc<dyn Device>),
    Effect(Arc<dyn Effect>),
    Scene(Arc<dyn Scene>),
}

impl Entity {
    pub fn name(&self) -> &str {
        match self {
            Entity::Runnable(r) => r.name(),
            Entity::Device(d) => d.name(),
            Entity::Effect(e) => e.name(),
            Entity::Scene(s) => s.name(),
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Entity::Runnable(_) => "runnable",
            Entity::Device(_) => "device",
            Entity::Effect(_) => "effect",
            Entity::Scene(_) => "scene",
        }
    }
}

/// Name lookup shared by the per-kind registries.
pub(crate) trait Named {
    fn entity_name(&self) -> &str;
}

impl Named for dyn Runnable {
    fn entity_name(&self) -> &str {
        self.name()
    }
}

impl Named for dyn Device {
    fn entity_name(&self) -> &str {
        self.name()
    }
}

impl Named for dyn Effect {
    fn entity_name(&self) -> &str {
        self.name()
    }
}

impl Named for dyn Scene {
    fn entity_name(&self) -> &str {
        self.name()
    }
}
