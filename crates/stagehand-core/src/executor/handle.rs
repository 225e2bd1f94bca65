use std::{fmt, sync::Arc};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use stagehand_model::JobStatus;

/// Handle to one submitted job instance.
#[derive(Clone)]
pub struct JobHandle {
    job: Arc<str>,
    instance: u64,
    cancel: CancellationToken,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub(crate) fn new(
        job: Arc<str>,
        instance: u64,
        cancel: CancellationToken,
        status: watch::Receiver<JobStatus>,
    ) -> Self {
        Self {
            job,
            instance,
            cancel,
            status,
        }
    }

    pub fn name(&self) -> &str {
        &self.job
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Request cancellation of this instance only. Does not wait.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Wait until the instance reaches a terminal status.
    pub async fn wait(&self) -> JobStatus {
        let mut rx = self.status.clone();
        let terminal = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => Some(*status),
            Err(_) => None,
        };
        // sender dropped: whatever was last published is final
        terminal.unwrap_or_else(|| *rx.borrow())
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("job", &self.job)
            .field("instance", &self.instance)
            .field("status", &self.status())
            .finish()
    }
}
