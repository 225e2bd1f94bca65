use thiserror::Error;

/// Errors a job body may return.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job observed its cancellation signal and stopped.
    #[error("operation cancelled")]
    Canceled,

    /// The job failed; the instance ends `Faulted`.
    #[error("execution failed: {reason}")]
    Fail { reason: String },
}

impl JobError {
    pub fn fail(reason: impl Into<String>) -> Self {
        JobError::Fail {
            reason: reason.into(),
        }
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Canceled => "job_canceled",
            JobError::Fail { .. } => "job_failed",
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, JobError::Canceled)
    }
}
