//! Job abstraction and its closure-backed implementation.
use std::{borrow::Cow, future::Future, sync::Arc};

use async_trait::async_trait;

use stagehand_model::InstancePolicy;

use crate::executor::{JobContext, JobError};

/// Asynchronous, cancellable unit of work run by the executor.
///
/// Identity is the `Arc` itself: submitting the same [`JobRef`] twice is
/// "the same job" for single-instance deduplication and for `cancel`.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use stagehand_core::executor::{Job, JobContext, JobError};
///
/// struct Blink;
///
/// #[async_trait]
/// impl Job for Blink {
///     fn name(&self) -> &str { "blink" }
///
///     async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
///         while !ctx.is_cancelled() {
///             ctx.sleep(std::time::Duration::from_millis(500)).await?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Whether concurrent instances are allowed. Single by default.
    fn instances(&self) -> InstancePolicy {
        InstancePolicy::Single
    }

    async fn execute(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// Shared job handle.
pub type JobRef = Arc<dyn Job>;

/// Identity of a job: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct JobKey(usize);

impl JobKey {
    pub(crate) fn of(job: &JobRef) -> Self {
        JobKey(Arc::as_ptr(job) as *const () as usize)
    }
}

/// Job backed by a closure that creates a fresh future per run.
pub struct JobFn<F> {
    name: Cow<'static, str>,
    instances: InstancePolicy,
    f: F,
}

impl<F> JobFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            instances: InstancePolicy::Single,
            f,
        }
    }

    /// Single-instance job as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }

    /// Job that may run any number of instances at once.
    pub fn multi(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self {
            instances: InstancePolicy::Multi,
            ..Self::new(name, f)
        })
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn instances(&self) -> InstancePolicy {
        self.instances
    }

    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}
