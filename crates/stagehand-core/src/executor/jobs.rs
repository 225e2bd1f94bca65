use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{FutureExt, future::join_all};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use stagehand_model::JobStatus;

use crate::{metrics::JobOutcome, panic::panic_message};

use super::{
    Executor, JobContext, JobError, JobEvent, JobEventKind, JobHandle, JobRef, job::JobKey,
    next_instance_id,
};

/// One live instance in the job table.
pub(crate) struct ActiveJob {
    instance: u64,
    name: Arc<str>,
    cancel: CancellationToken,
    status: watch::Receiver<JobStatus>,
}

impl Executor {
    /// Submit `job` and return immediately.
    ///
    /// Returns `None` when the job is single-instance and already running;
    /// the call is then a logged no-op.
    pub fn execute(&self, job: &JobRef) -> Option<JobHandle> {
        let key = JobKey::of(job);
        let name: Arc<str> = Arc::from(job.name());
        let instance = next_instance_id();
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(JobStatus::Pending);

        {
            let mut jobs = self.inner.jobs.lock();
            let running = jobs.get(&key).is_some_and(|live| !live.is_empty());
            if running && !job.instances().allows_concurrent() {
                drop(jobs);
                info!(job = %name, "job already running, skipped");
                self.publish(JobEvent::skipped(name));
                return None;
            }
            jobs.entry(key).or_default().push(ActiveJob {
                instance,
                name: name.clone(),
                cancel: cancel.clone(),
                status: rx.clone(),
            });
        }

        let ctx = JobContext::new(cancel.clone(), name.clone(), instance);
        self.inner
            .runtime
            .spawn(self.clone().drive(job.clone(), key, ctx, tx));

        Some(JobHandle::new(name, instance, cancel, rx))
    }

    /// Submit `job` and wait for its terminal status.
    ///
    /// `None` if the job was skipped as already running.
    pub async fn execute_and_wait(&self, job: &JobRef) -> Option<JobStatus> {
        match self.execute(job) {
            Some(handle) => Some(handle.wait().await),
            None => None,
        }
    }

    /// Cancel every running instance of `job` and wait for all of them to exit.
    ///
    /// Returns how many instances were signalled.
    pub async fn cancel(&self, job: &JobRef) -> usize {
        let targets = self.instances_of(JobKey::of(job));
        if targets.is_empty() {
            return 0;
        }

        let started = Instant::now();
        for (cancel, _) in &targets {
            cancel.cancel();
        }
        let count = targets.len();
        for (_, mut status) in targets {
            let _ = status.wait_for(|s| s.is_terminal()).await;
        }

        info!(
            job = job.name(),
            instances = count,
            waited_ms = started.elapsed().as_millis() as u64,
            "job cancelled"
        );
        count
    }

    pub fn is_running(&self, job: &JobRef) -> bool {
        self.inner
            .jobs
            .lock()
            .get(&JobKey::of(job))
            .is_some_and(|live| !live.is_empty())
    }

    /// Name and instance id of every live job instance.
    pub fn active_jobs(&self) -> Vec<(String, u64)> {
        let jobs = self.inner.jobs.lock();
        let mut out: Vec<(String, u64)> = jobs
            .values()
            .flatten()
            .map(|a| (a.name.to_string(), a.instance))
            .collect();
        out.sort_by_key(|(_, instance)| *instance);
        out
    }

    /// True once no job instance is live.
    pub fn everything_stopped(&self) -> bool {
        self.inner.jobs.lock().values().all(Vec::is_empty)
    }

    /// Wait up to `budget` for every live job to exit. Does not cancel.
    ///
    /// Returns `false` (and logs the stragglers) on timeout.
    pub async fn wait_to_stop(&self, budget: Duration) -> bool {
        let pending: Vec<watch::Receiver<JobStatus>> = self
            .inner
            .jobs
            .lock()
            .values()
            .flatten()
            .map(|a| a.status.clone())
            .collect();
        if pending.is_empty() {
            return true;
        }

        let all = join_all(pending.into_iter().map(|mut status| async move {
            let _ = status.wait_for(|s| s.is_terminal()).await;
        }));

        match tokio::time::timeout(budget, all).await {
            Ok(_) => true,
            Err(_) => {
                let stuck: Vec<String> = self.active_jobs().into_iter().map(|(n, _)| n).collect();
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    stuck = ?stuck,
                    "jobs did not stop within budget"
                );
                false
            }
        }
    }

    /// Request cancellation of every live instance. Does not wait.
    pub(crate) fn cancel_all(&self) -> usize {
        let jobs = self.inner.jobs.lock();
        let mut count = 0;
        for active in jobs.values().flatten() {
            active.cancel.cancel();
            count += 1;
        }
        count
    }

    fn instances_of(&self, key: JobKey) -> Vec<(CancellationToken, watch::Receiver<JobStatus>)> {
        self.inner
            .jobs
            .lock()
            .get(&key)
            .map(|live| {
                live.iter()
                    .map(|a| (a.cancel.clone(), a.status.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn retire(&self, key: JobKey, instance: u64) {
        let mut jobs = self.inner.jobs.lock();
        if let Some(live) = jobs.get_mut(&key) {
            live.retain(|a| a.instance != instance);
            if live.is_empty() {
                jobs.remove(&key);
            }
        }
    }

    /// Body of the spawned task for one instance.
    async fn drive(
        self,
        job: JobRef,
        key: JobKey,
        ctx: JobContext,
        status: watch::Sender<JobStatus>,
    ) {
        let name: Arc<str> = Arc::from(ctx.job());
        let instance = ctx.instance();
        let metrics = self.inner.ctx.metrics().clone();

        metrics.record_job_started(&name);
        debug!(job = %name, instance, "job started");
        self.publish(JobEvent::started(name.clone(), instance));
        status.send_replace(JobStatus::Running);

        let started = Instant::now();
        let result = AssertUnwindSafe(job.execute(ctx)).catch_unwind().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (terminal, kind, reason) = match result {
            Ok(Ok(())) => (JobStatus::Completed, JobEventKind::Completed, None),
            Ok(Err(JobError::Canceled)) => (JobStatus::Cancelled, JobEventKind::Cancelled, None),
            Ok(Err(e)) => {
                error!(job = %name, instance, error = %e, "job faulted");
                (JobStatus::Faulted, JobEventKind::Faulted, Some(e.to_string()))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(job = %name, instance, reason = %reason, "job panicked");
                (JobStatus::Faulted, JobEventKind::Faulted, Some(reason))
            }
        };

        if let Some(outcome) = JobOutcome::from_status(terminal) {
            metrics.record_job_completed(&name, outcome, elapsed_ms);
        }
        // retire and publish before the status flips so waiters observe both
        self.retire(key, instance);
        debug!(job = %name, instance, status = terminal.as_label(), elapsed_ms, "job finished");
        self.publish(JobEvent::finished(kind, name, instance, elapsed_ms, reason));
        status.send_replace(terminal);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::{context::RuntimeContext, executor::JobFn};

    struct Exploding;

    #[async_trait::async_trait]
    impl crate::executor::Job for Exploding {
        fn name(&self) -> &str {
            "panics"
        }

        async fn execute(&self, _ctx: JobContext) -> Result<(), JobError> {
            panic!("lamp exploded")
        }
    }

    fn executor() -> Executor {
        Executor::new(RuntimeContext::default()).unwrap()
    }

    fn until_cancelled(name: &'static str) -> JobRef {
        JobFn::arc(name, |ctx: JobContext| async move {
            ctx.cancelled().await;
            Err(JobError::Canceled)
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_instance_job_is_deduplicated() {
        let exec = executor();
        let job = until_cancelled("chase");

        let first = exec.execute(&job).expect("first run");
        assert!(exec.execute(&job).is_none());
        assert!(exec.is_running(&job));
        assert_eq!(exec.active_jobs().len(), 1);

        assert_eq!(exec.cancel(&job).await, 1);
        assert_eq!(first.wait().await, JobStatus::Cancelled);
        assert!(!exec.is_running(&job));
        assert!(exec.everything_stopped());

        // finished jobs may run again
        let again = exec.execute(&job).expect("second run");
        again.cancel();
        assert_eq!(again.wait().await, JobStatus::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multi_instance_job_runs_concurrently() {
        let exec = executor();
        let job: JobRef = JobFn::multi("sparkle", |ctx: JobContext| async move {
            ctx.cancelled().await;
            Err(JobError::Canceled)
        });

        let handles: Vec<_> = (0..3).map(|_| exec.execute(&job).unwrap()).collect();
        assert_eq!(exec.active_jobs().len(), 3);

        assert_eq!(exec.cancel(&job).await, 3);
        for h in handles {
            assert_eq!(h.status(), JobStatus::Cancelled);
        }
        assert!(exec.everything_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failures_and_panics_are_contained() {
        let exec = executor();
        let fails: JobRef = JobFn::arc("fails", |_ctx: JobContext| async {
            Err(JobError::fail("cue missing"))
        });
        let panics: JobRef = Arc::new(Exploding);
        let fine: JobRef = JobFn::arc("fine", |_ctx: JobContext| async { Ok(()) });

        assert_eq!(exec.execute_and_wait(&fails).await, Some(JobStatus::Faulted));
        assert_eq!(exec.execute_and_wait(&panics).await, Some(JobStatus::Faulted));
        assert_eq!(exec.execute_and_wait(&fine).await, Some(JobStatus::Completed));
        assert!(exec.everything_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn events_describe_the_lifecycle() {
        let exec = executor();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            exec.events()
                .subscribe_fn(move |e: &JobEvent| seen.lock().push((e.kind, e.reason.clone())))
                .unwrap();
        }

        let ok: JobRef = JobFn::arc("ok", |_ctx: JobContext| async { Ok(()) });
        exec.execute_and_wait(&ok).await;
        let bad: JobRef = JobFn::arc("bad", |_ctx: JobContext| async {
            Err(JobError::fail("nope"))
        });
        exec.execute_and_wait(&bad).await;

        let blocker = until_cancelled("blocker");
        let handle = exec.execute(&blocker).unwrap();
        while handle.status() == JobStatus::Pending {
            tokio::task::yield_now().await;
        }
        assert!(exec.execute(&blocker).is_none());
        handle.cancel();
        handle.wait().await;

        let kinds: Vec<JobEventKind> = seen.lock().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                JobEventKind::Started,
                JobEventKind::Completed,
                JobEventKind::Started,
                JobEventKind::Faulted,
                JobEventKind::Started,
                JobEventKind::Skipped,
                JobEventKind::Cancelled,
            ]
        );
        assert_eq!(seen.lock()[3].1.as_deref(), Some("execution failed: nope"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn checkpoints_stop_a_polling_job() {
        let exec = executor();
        let loops = Arc::new(AtomicUsize::new(0));
        let job: JobRef = {
            let loops = loops.clone();
            JobFn::arc("poller", move |ctx: JobContext| {
                let loops = loops.clone();
                async move {
                    while !ctx.is_cancelled() {
                        loops.fetch_add(1, Ordering::Relaxed);
                        ctx.sleep(Duration::from_millis(5)).await?;
                    }
                    ctx.checkpoint()
                }
            })
        };

        let handle = exec.execute(&job).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        exec.cancel(&job).await;

        assert_eq!(handle.status(), JobStatus::Cancelled);
        assert!(loops.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wait_to_stop_times_out_on_stubborn_jobs() {
        let exec = executor();
        let stubborn: JobRef = JobFn::arc("stubborn", |_ctx: JobContext| async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok(())
        });
        let polite = until_cancelled("polite");

        exec.execute(&stubborn).unwrap();
        exec.execute(&polite).unwrap();
        exec.stop();

        assert!(!exec.wait_to_stop(Duration::from_millis(50)).await);
        assert!(!exec.is_running(&polite));
        assert!(exec.is_running(&stubborn));

        assert!(exec.wait_to_stop(Duration::from_secs(5)).await);
        assert!(exec.everything_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_cancels_and_waits() {
        let exec = executor();
        let handle = exec.execute(&until_cancelled("loop")).unwrap();

        assert!(exec.shutdown().await);
        assert_eq!(handle.status(), JobStatus::Cancelled);
        assert!(exec.wait_to_stop(Duration::ZERO).await);
    }
}
