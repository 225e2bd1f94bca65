pub mod arbiter;
pub mod cell;
pub mod context;
pub mod error;
pub mod executor;
pub mod fade;
pub mod metrics;
mod panic;
pub mod sweep;

pub use context::RuntimeContext;
pub use error::CoreError;
pub use metrics::{JobOutcome, MetricsBackend, MetricsHandle, NoOpMetrics, noop_metrics};

pub mod prelude {
    pub use crate::arbiter::{ControlToken, DeviceId, OwnedDevice, OwnershipArbiter};
    pub use crate::cell::{BroadcastCell, CellError, ControlCell, Observer, Subscription};
    pub use crate::context::RuntimeContext;
    pub use crate::error::CoreError;
    pub use crate::executor::{
        Device, Effect, Entity, Executor, Job, JobContext, JobError, JobEvent, JobEventKind, JobFn,
        JobHandle, JobRef, ManagedId, Runnable, Scene,
    };
    pub use crate::fade::Fade;
    pub use crate::sweep::{SweepEffect, SweepFrame, SweepShape, Sweeper};
}
