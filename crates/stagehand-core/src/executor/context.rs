use std::{fmt, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::executor::JobError;

/// Handed to every job body: identity plus the cooperative cancellation signal.
///
/// Cancellation is never forced. Long-running bodies should call
/// [`JobContext::checkpoint`] or use [`JobContext::sleep`] at their yield points.
#[derive(Clone)]
pub struct JobContext {
    token: CancellationToken,
    job: Arc<str>,
    instance: u64,
}

impl JobContext {
    pub(crate) fn new(token: CancellationToken, job: Arc<str>, instance: u64) -> Self {
        Self {
            token,
            job,
            instance,
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// `Err(Canceled)` if cancellation was requested, for use with `?`.
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.token.is_cancelled() {
            Err(JobError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `period`, waking early with `Err(Canceled)` on cancellation.
    pub async fn sleep(&self, period: Duration) -> Result<(), JobError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(JobError::Canceled),
            _ = tokio::time::sleep(period) => Ok(()),
        }
    }

    /// Underlying token, for handing to libraries that take one.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job", &self.job)
            .field("instance", &self.instance)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> JobContext {
        JobContext::new(CancellationToken::new(), Arc::from("fade"), 7)
    }

    #[test]
    fn checkpoint_reports_cancellation() {
        let ctx = ctx();
        assert_eq!(ctx.checkpoint(), Ok(()));

        ctx.token().cancel();
        assert_eq!(ctx.checkpoint(), Err(JobError::Canceled));
        assert_eq!(ctx.job(), "fade");
        assert_eq!(ctx.instance(), 7);
    }

    #[tokio::test]
    async fn sleep_wakes_early_on_cancel() {
        let ctx = ctx();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.token().cancel();
        });

        let res = ctx.sleep(Duration::from_secs(30)).await;
        assert_eq!(res, Err(JobError::Canceled));
    }

    #[tokio::test]
    async fn sleep_completes_when_not_cancelled() {
        assert_eq!(ctx().sleep(Duration::from_millis(5)).await, Ok(()));
    }
}
