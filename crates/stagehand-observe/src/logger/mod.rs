mod config;
mod error;
mod install;
mod object;

#[cfg(feature = "timezone-sync")]
mod tasks;

pub use config::LoggerConfig;
pub use error::{LoggerError, LoggerResult};
pub use object::{LoggerFormat, LoggerLevel, LoggerTimeZone, ShowClock, init_local_offset};

#[cfg(feature = "timezone-sync")]
pub use tasks::{TZ_SYNC_JOB_NAME, TZ_SYNC_PERIOD, timezone_sync};

/// Install the global tracing subscriber described by `cfg`.
///
/// Call once, early in `main`. A second call fails with
/// [`LoggerError::AlreadyInitialized`].
///
/// With [`LoggerTimeZone::Local`], call [`init_local_offset`] before the
/// tokio runtime starts any threads.
///
/// # Examples
/// ```rust
/// use stagehand_observe::{LoggerConfig, init_logger};
///
/// let config = LoggerConfig::default();
/// init_logger(&config).expect("logger");
/// tracing::info!("console ready");
/// ```
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => install::text(cfg),
        LoggerFormat::Json => install::json(cfg),
        LoggerFormat::Journald => install::journald(cfg),
    }
}
