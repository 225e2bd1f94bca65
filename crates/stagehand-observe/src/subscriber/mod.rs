//! Observers that turn runtime feeds into structured log records.
//!
//! Severity follows what an operator needs to see during a show: faults are
//! errors, skips and ownership handovers are informational, routine starts
//! and completions stay at debug.
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use stagehand_core::{
    arbiter::{OwnerChange, OwnerInfo, OwnershipArbiter},
    cell::{CellError, CellFailure, Observer, Subscription},
    executor::{Executor, JobEvent, JobEventKind},
};

/// Logs every [`JobEvent`] published by an executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct JobEventLogger;

impl JobEventLogger {
    /// Subscribe a logger to `executor`'s event feed.
    pub fn attach(executor: &Executor) -> Result<Subscription, CellError> {
        executor.events().subscribe(Arc::new(JobEventLogger))
    }
}

impl Observer<JobEvent> for JobEventLogger {
    fn on_next(&self, event: &JobEvent) {
        log_job_event(event);
    }

    fn on_error(&self, failure: &CellFailure) {
        error!(reason = %failure, "job event feed failed");
    }

    fn on_completed(&self) {
        debug!("job event feed closed");
    }
}

/// Logs device ownership handovers from an arbiter's registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerChangeLogger;

impl OwnerChangeLogger {
    pub fn attach(arbiter: &OwnershipArbiter) -> Result<Subscription, CellError> {
        arbiter
            .registry()
            .changes()
            .subscribe(Arc::new(OwnerChangeLogger))
    }
}

impl Observer<OwnerChange> for OwnerChangeLogger {
    fn on_next(&self, change: &OwnerChange) {
        let from = describe(change.previous.as_ref());
        let to = describe(change.current.as_ref());
        match (&change.previous, &change.current) {
            (_, Some(_)) => info!(device = %change.device_name, %from, %to, "device control handed over"),
            (Some(_), None) => info!(device = %change.device_name, %from, "device released"),
            (None, None) => trace!(device = %change.device_name, "device ownership unchanged"),
        }
    }
}

fn describe(owner: Option<&OwnerInfo>) -> String {
    owner
        .map(|o| format!("{}@{}", o.name, o.priority))
        .unwrap_or_else(|| "-".to_string())
}

fn log_job_event(e: &JobEvent) {
    let msg = message_for(e.kind);
    let instance = e.instance.unwrap_or(0);
    let reason = e.reason.as_deref().unwrap_or("unknown");
    let elapsed_ms = e.elapsed_ms.unwrap_or(0);

    match e.kind {
        JobEventKind::Started => debug!(job = %e.job, instance, "{msg}"),
        JobEventKind::Completed => debug!(job = %e.job, instance, elapsed_ms, "{msg}"),
        JobEventKind::Cancelled => info!(job = %e.job, instance, elapsed_ms, "{msg}"),
        JobEventKind::Faulted => error!(job = %e.job, instance, elapsed_ms, reason, "{msg}"),
        JobEventKind::Skipped => info!(job = %e.job, "{msg}"),
    }
}

/// Primary log message per event kind; fields carry the details.
#[inline]
fn message_for(kind: JobEventKind) -> &'static str {
    match kind {
        JobEventKind::Started => "job started",
        JobEventKind::Completed => "job completed",
        JobEventKind::Cancelled => "job stopped after cancellation",
        JobEventKind::Faulted => "job faulted (failure or panic contained)",
        JobEventKind::Skipped => "single-instance job already running; submission skipped",
    }
}

#[cfg(test)]
mod tests {
    use stagehand_core::{
        RuntimeContext,
        executor::{JobContext, JobError, JobFn, JobRef},
    };
    use stagehand_model::{JobStatus, Priority};

    use super::*;

    #[test]
    fn every_kind_has_a_message() {
        for kind in [
            JobEventKind::Started,
            JobEventKind::Completed,
            JobEventKind::Cancelled,
            JobEventKind::Faulted,
            JobEventKind::Skipped,
        ] {
            assert!(!message_for(kind).is_empty());
        }
    }

    #[test]
    fn owner_description() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("spot");
        let token = arb.acquire(dev, Priority::new(4), "chase");

        let info = arb.registry().owner(dev).unwrap();
        assert_eq!(describe(Some(&info)), format!("chase@{}", token.priority()));
        assert_eq!(describe(None), "-");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loggers_attach_and_survive_a_show() {
        let exec = Executor::new(RuntimeContext::default()).unwrap();
        let arb = OwnershipArbiter::new();
        let jobs = JobEventLogger::attach(&exec).unwrap();
        let owners = OwnerChangeLogger::attach(&arb).unwrap();

        let dev = arb.register_device("hazer");
        let token = arb.acquire(dev, Priority::new(2), "scene");
        token.release();

        let bad: JobRef = JobFn::arc("bad", |_ctx: JobContext| async {
            Err(JobError::fail("dmx offline"))
        });
        assert_eq!(exec.execute_and_wait(&bad).await, Some(JobStatus::Faulted));

        assert!(jobs.is_active());
        assert!(owners.is_active());
        jobs.unsubscribe();
        owners.unsubscribe();
    }
}
