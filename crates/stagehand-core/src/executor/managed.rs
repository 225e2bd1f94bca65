use std::{fmt, future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::panic::panic_message;

use super::{Executor, JobContext, JobError, next_instance_id};

/// Id of a task started with [`Executor::spawn_managed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedId(u64);

impl fmt::Display for ManagedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "managed#{}", self.0)
    }
}

pub(crate) struct ManagedTask {
    id: ManagedId,
    name: Arc<str>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl Executor {
    /// Start a background task owned by the calling thread.
    ///
    /// Tasks are tracked per OS thread; [`Executor::wait_for_managed_tasks`]
    /// called later from the same thread collects them.
    ///
    /// On a multi-thread runtime an async caller can resume on another
    /// worker after any `.await`. Spawn and collect from a plain thread, or
    /// with no `.await` in between; otherwise the collect call finds nothing
    /// and the tasks stay registered under the first thread.
    pub fn spawn_managed<F, Fut>(&self, name: impl Into<String>, body: F) -> ManagedId
    where
        F: FnOnce(JobContext) -> Fut,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let name: Arc<str> = Arc::from(name.into());
        let id = ManagedId(next_instance_id());
        let cancel = CancellationToken::new();
        let fut = body(JobContext::new(cancel.clone(), name.clone(), id.0));

        let task = name.clone();
        let join = self.inner.runtime.spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) | Ok(Err(JobError::Canceled)) => {
                    debug!(task = %task, "managed task finished")
                }
                Ok(Err(e)) => error!(task = %task, error = %e, "managed task failed"),
                Err(panic) => error!(
                    task = %task,
                    reason = %panic_message(panic.as_ref()),
                    "managed task panicked"
                ),
            }
        });

        let thread = std::thread::current().id();
        let mut managed = self.inner.managed.lock();
        let tasks = managed.entry(thread).or_default();
        tasks.retain(|t| !t.join.is_finished());
        tasks.push(ManagedTask {
            id,
            name,
            cancel,
            join,
        });
        id
    }

    /// Cancel one managed task, whichever thread started it. Does not wait.
    pub fn stop_managed_task(&self, id: ManagedId) -> bool {
        let mut managed = self.inner.managed.lock();
        for tasks in managed.values_mut() {
            if let Some(pos) = tasks.iter().position(|t| t.id == id) {
                let task = tasks.swap_remove(pos);
                task.cancel.cancel();
                debug!(task = %task.name, id = %id, "managed task stop requested");
                return true;
            }
        }
        false
    }

    /// Number of unfinished managed tasks owned by the calling thread.
    pub fn managed_tasks(&self) -> usize {
        let thread = std::thread::current().id();
        self.inner
            .managed
            .lock()
            .get(&thread)
            .map(|tasks| tasks.iter().filter(|t| !t.join.is_finished()).count())
            .unwrap_or(0)
    }

    /// Wait for every managed task the calling thread started.
    ///
    /// The set of tasks is captured before the returned future is first
    /// polled, so the future may be awaited elsewhere. With `cancel_first`
    /// the tasks are signalled before waiting. Resolves to the number of
    /// tasks waited for.
    ///
    /// Only the calling OS thread's tasks are collected; see
    /// [`Executor::spawn_managed`] for what that means inside async code.
    pub fn wait_for_managed_tasks(
        &self,
        cancel_first: bool,
    ) -> impl Future<Output = usize> + Send + 'static {
        let thread = std::thread::current().id();
        let tasks = self.inner.managed.lock().remove(&thread).unwrap_or_default();
        debug!(tasks = tasks.len(), cancel_first, "waiting for managed tasks");

        if cancel_first {
            for task in &tasks {
                task.cancel.cancel();
            }
        }

        async move {
            let count = tasks.len();
            for task in tasks {
                if let Err(e) = task.join.await {
                    warn!(task = %task.name, error = %e, "managed task did not join cleanly");
                }
            }
            count
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::context::RuntimeContext;

    fn executor() -> Executor {
        Executor::new(RuntimeContext::default()).unwrap()
    }

    #[tokio::test]
    async fn cancel_first_stops_and_collects_tasks() {
        let exec = executor();
        let stopped = Arc::new(AtomicUsize::new(0));

        for name in ["hazer", "spots"] {
            let stopped = stopped.clone();
            exec.spawn_managed(name, move |ctx| async move {
                ctx.cancelled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
                Err(JobError::Canceled)
            });
        }
        assert_eq!(exec.managed_tasks(), 2);

        assert_eq!(exec.wait_for_managed_tasks(true).await, 2);
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
        assert_eq!(exec.managed_tasks(), 0);
    }

    #[tokio::test]
    async fn waits_for_natural_completion() {
        let exec = executor();
        let done = Arc::new(AtomicBool::new(false));
        {
            let done = done.clone();
            exec.spawn_managed("countdown", move |ctx| async move {
                ctx.sleep(Duration::from_millis(20)).await?;
                done.store(true, Ordering::SeqCst);
                Ok(())
            });
        }

        assert_eq!(exec.wait_for_managed_tasks(false).await, 1);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_task_is_still_collected() {
        let exec = executor();
        exec.spawn_managed("broken", |_ctx| async { Err(JobError::fail("no dmx")) });
        assert_eq!(exec.wait_for_managed_tasks(false).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tasks_belong_to_the_spawning_thread() {
        let exec = executor();

        let other = exec.clone();
        let id = std::thread::spawn(move || {
            other.spawn_managed("remote", |ctx| async move {
                ctx.cancelled().await;
                Err(JobError::Canceled)
            })
        })
        .join()
        .unwrap();

        // nothing was started from this thread
        assert_eq!(exec.wait_for_managed_tasks(true).await, 0);

        assert!(exec.stop_managed_task(id));
        assert!(!exec.stop_managed_task(id));
    }

    #[test]
    fn plain_threads_collect_only_their_own_tasks() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let exec = Executor::with_handle(RuntimeContext::default(), rt.handle().clone());

        let workers: Vec<_> = (1..=3usize)
            .map(|count| {
                let exec = exec.clone();
                let handle = rt.handle().clone();
                std::thread::spawn(move || {
                    for i in 0..count {
                        exec.spawn_managed(format!("cue-{count}-{i}"), |ctx| async move {
                            ctx.cancelled().await;
                            Err(JobError::Canceled)
                        });
                    }
                    handle.block_on(exec.wait_for_managed_tasks(true))
                })
            })
            .collect();

        let collected: Vec<usize> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(collected, vec![1, 2, 3]);
        assert_eq!(exec.managed_tasks(), 0);
    }
}
