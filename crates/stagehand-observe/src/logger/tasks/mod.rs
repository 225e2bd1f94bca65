mod timezone_sync;
pub use timezone_sync::{TZ_SYNC_JOB_NAME, TZ_SYNC_PERIOD, timezone_sync};
