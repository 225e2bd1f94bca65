//! Lifecycle coordinator for runnables, devices, effects and scenes, plus
//! the async job runner.
//!
//! - Entities are registered once by name and driven through [`Executor::run`]
//!   and [`Executor::stop`] in a fixed phase order.
//! - Jobs are submitted with [`Executor::execute`]; single-instance jobs are
//!   deduplicated by identity.
//! - Managed tasks are tracked per calling thread and awaited with
//!   [`Executor::wait_for_managed_tasks`].
mod context;
mod entity;
mod error;
mod event;
mod handle;
mod job;
mod jobs;
mod managed;

pub use context::JobContext;
pub use entity::{Device, Effect, Entity, Runnable, Scene};
pub use error::JobError;
pub use event::{JobEvent, JobEventKind};
pub use handle::JobHandle;
pub use job::{Job, JobFn, JobRef};
pub use managed::ManagedId;

use std::{
    collections::HashMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::ThreadId,
};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument};

use stagehand_model::RunnableKind;

use crate::{cell::BroadcastCell, context::RuntimeContext, error::CoreError, panic::panic_message};

use entity::Named;
use job::JobKey;
use jobs::ActiveJob;
use managed::ManagedTask;

static INSTANCE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-wide id for job instances and managed tasks.
fn next_instance_id() -> u64 {
    INSTANCE_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Coordinates show entities and runs jobs on the tokio runtime.
///
/// Cheap to clone; clones share the same registries and job table.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: RuntimeContext,
    runtime: Handle,

    runnables: Mutex<Vec<Arc<dyn Runnable>>>,
    devices: Mutex<Vec<Arc<dyn Device>>>,
    effects: Mutex<Vec<Arc<dyn Effect>>>,
    scenes: Mutex<Vec<Arc<dyn Scene>>>,

    jobs: Mutex<HashMap<JobKey, Vec<ActiveJob>>>,
    managed: Mutex<HashMap<ThreadId, Vec<ManagedTask>>>,
    events: BroadcastCell<JobEvent>,
}

impl Executor {
    /// Create an executor bound to the current tokio runtime.
    pub fn new(ctx: RuntimeContext) -> Result<Self, CoreError> {
        let runtime = Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        Ok(Self::with_handle(ctx, runtime))
    }

    /// Create an executor that spawns onto `runtime`.
    pub fn with_handle(ctx: RuntimeContext, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                runtime,
                runnables: Mutex::new(Vec::new()),
                devices: Mutex::new(Vec::new()),
                effects: Mutex::new(Vec::new()),
                scenes: Mutex::new(Vec::new()),
                jobs: Mutex::new(HashMap::new()),
                managed: Mutex::new(HashMap::new()),
                events: BroadcastCell::empty(),
            }),
        }
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.inner.ctx
    }

    /// Job lifecycle feed. Observers run on the job's worker thread.
    pub fn events(&self) -> &BroadcastCell<JobEvent> {
        &self.inner.events
    }

    /// Add an entity to its registry. Names are unique per kind.
    #[instrument(level = "debug", skip(self, entity), fields(kind = entity.kind_label(), name = %entity.name()))]
    pub fn register(&self, entity: Entity) -> Result<(), CoreError> {
        let kind = entity.kind_label();
        match entity {
            Entity::Runnable(r) => insert_unique(&self.inner.runnables, kind, r),
            Entity::Device(d) => insert_unique(&self.inner.devices, kind, d),
            Entity::Effect(e) => insert_unique(&self.inner.effects, kind, e),
            Entity::Scene(s) => insert_unique(&self.inner.scenes, kind, s),
        }?;
        debug!("registered");
        Ok(())
    }

    /// Bring everything up.
    ///
    /// Order: logical runnables, device initial states, output hardware,
    /// device outputs, input hardware, remaining runnables, scenes.
    pub fn run(&self) {
        let runnables = self.inner.runnables.lock().clone();
        let devices = self.inner.devices.lock().clone();
        let scenes = self.inner.scenes.lock().clone();
        info!(
            runnables = runnables.len(),
            devices = devices.len(),
            scenes = scenes.len(),
            "starting show"
        );

        start_kind(&runnables, RunnableKind::Logical);
        for device in &devices {
            device.set_initial_state();
        }
        start_kind(&runnables, RunnableKind::OutputHardware);
        for device in &devices {
            device.enable_output();
        }
        start_kind(&runnables, RunnableKind::InputHardware);
        start_kind(&runnables, RunnableKind::Other);

        for scene in &scenes {
            debug!(scene = scene.name(), "running scene");
            scene.run();
        }
    }

    /// Bring everything down without waiting for jobs to exit.
    ///
    /// Order: effects, job cancellation, scenes, master power off,
    /// runnables stop, runnables dispose. Use [`Executor::wait_to_stop`]
    /// or [`Executor::shutdown`] to wait for jobs.
    pub fn stop(&self) {
        let effects = self.inner.effects.lock().clone();
        let scenes = self.inner.scenes.lock().clone();
        let devices = self.inner.devices.lock().clone();
        let runnables = self.inner.runnables.lock().clone();
        info!("stopping show");

        for effect in &effects {
            effect.stop();
        }

        let cancelled = self.cancel_all();
        debug!(jobs = cancelled, "cancellation requested");

        for scene in &scenes {
            scene.stop();
        }

        for device in &devices {
            if let Some(power) = device.master_power() {
                if let Err(e) = power.set(false) {
                    debug!(device = device.name(), error = %e, "master power already closed");
                }
            }
        }

        for runnable in &runnables {
            runnable.stop();
        }
        for runnable in &runnables {
            runnable.dispose();
        }
    }

    /// Stop, then wait up to the configured stop budget for jobs to exit.
    pub async fn shutdown(&self) -> bool {
        self.stop();
        let budget = self.inner.ctx.config().stop_budget();
        let clean = self.wait_to_stop(budget).await;
        if clean {
            info!("show stopped");
        }
        clean
    }

    fn publish(&self, event: JobEvent) {
        match catch_unwind(AssertUnwindSafe(|| self.inner.events.set(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "job event feed closed"),
            Err(panic) => error!(
                reason = %panic_message(panic.as_ref()),
                "job event observer panicked"
            ),
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("runnables", &self.inner.runnables.lock().len())
            .field("devices", &self.inner.devices.lock().len())
            .field("effects", &self.inner.effects.lock().len())
            .field("scenes", &self.inner.scenes.lock().len())
            .field("jobs", &self.inner.jobs.lock().len())
            .finish()
    }
}

fn insert_unique<E>(list: &Mutex<Vec<Arc<E>>>, kind: &'static str, item: Arc<E>) -> Result<(), CoreError>
where
    E: Named + ?Sized,
{
    let mut list = list.lock();
    if list.iter().any(|e| e.entity_name() == item.entity_name()) {
        return Err(CoreError::AlreadyRegistered {
            kind,
            name: item.entity_name().to_string(),
        });
    }
    list.push(item);
    Ok(())
}

fn start_kind(runnables: &[Arc<dyn Runnable>], kind: RunnableKind) {
    for runnable in runnables.iter().filter(|r| r.kind() == kind) {
        debug!(runnable = runnable.name(), kind = kind.as_label(), "starting");
        runnable.start();
    }
}
