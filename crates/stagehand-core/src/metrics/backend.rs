use std::sync::Arc;

use stagehand_model::JobStatus;

/// How a job instance ended, for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job body returned normally.
    Completed,
    /// Job body failed or panicked.
    Faulted,
    /// Job observed its cancellation signal.
    Cancelled,
}

impl JobOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Faulted => "faulted",
            JobOutcome::Cancelled => "cancelled",
        }
    }

    /// Map a terminal status onto an outcome. `None` for non-terminal states.
    pub fn from_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Completed => Some(JobOutcome::Completed),
            JobStatus::Faulted => Some(JobOutcome::Faulted),
            JobStatus::Cancelled => Some(JobOutcome::Cancelled),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}

/// Backend metrics collection interface.
///
/// Implementations are injected via [`crate::RuntimeContext`] and shared by
/// the executor and every sweeper.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record a job instance entering `Running`.
    fn record_job_started(&self, job: &str);
    /// Record a job instance reaching a terminal state.
    ///
    /// # Arguments
    /// - `job`: Job name
    /// - `outcome`: How the instance terminated
    /// - `duration_ms`: Time spent in `Running`
    fn record_job_completed(&self, job: &str, outcome: JobOutcome, duration_ms: u64);
    /// Record a tick whose dispatch was skipped because the previous one was still running.
    fn record_missed_tick(&self, sweeper: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
