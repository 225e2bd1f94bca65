//! Job that keeps the cached local offset current across DST changes.
//!
//! Requires `init_local_offset()` in `main()`; later detection may fail in a
//! multi-threaded process, in which case the cached offset is kept.
use std::time::Duration;

use tracing::{debug, info};

use stagehand_core::executor::{JobContext, JobError, JobFn, JobRef};

use crate::logger::object::timezone::{describe_offset, local_offset, refresh_local_offset};

pub const TZ_SYNC_JOB_NAME: &str = "stagehand-logger-tz-sync";

/// Pause between offset checks.
pub const TZ_SYNC_PERIOD: Duration = Duration::from_secs(3600);

/// Build the sync job. It checks immediately, then once per
/// [`TZ_SYNC_PERIOD`], until cancelled.
///
/// ```no_run
/// # async fn demo(executor: stagehand_core::executor::Executor) {
/// let job = stagehand_observe::timezone_sync();
/// executor.execute(&job);
/// # }
/// ```
pub fn timezone_sync() -> JobRef {
    JobFn::arc(TZ_SYNC_JOB_NAME, run)
}

async fn run(ctx: JobContext) -> Result<(), JobError> {
    debug!("timezone sync started");
    while !ctx.is_cancelled() {
        sync_once()?;
        ctx.sleep(TZ_SYNC_PERIOD).await?;
    }
    Err(JobError::Canceled)
}

fn sync_once() -> Result<(), JobError> {
    match refresh_local_offset() {
        Ok(Some(old)) => {
            info!(
                from = %describe_offset(old),
                to = %describe_offset(local_offset()),
                "local offset changed"
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(JobError::fail(format!("timezone sync: {e}"))),
    }
}
