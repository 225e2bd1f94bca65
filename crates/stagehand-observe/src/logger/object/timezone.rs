use std::{
    fmt,
    str::FromStr,
    sync::{Once, RwLock},
};

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::logger::error::LoggerError;

/// Last known local offset. UTC until detected.
static LOCAL_OFFSET: RwLock<UtcOffset> = RwLock::new(UtcOffset::UTC);

static DETECTED: Once = Once::new();

/// Zone used for log timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerTimeZone {
    #[default]
    Utc,
    Local,
}

impl FromStr for LoggerTimeZone {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" | "z" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            _ => Err(LoggerError::InvalidTimeZone(s.to_string())),
        }
    }
}

impl fmt::Display for LoggerTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoggerTimeZone::Utc => "utc",
            LoggerTimeZone::Local => "local",
        })
    }
}

/// Detect the local offset while the process is still single-threaded.
///
/// Most Unix platforms refuse offset detection once other threads exist, so
/// call this at the top of `main`, before building the tokio runtime.
/// Falls back to UTC when detection fails.
///
/// ```no_run
/// fn main() {
///     stagehand_observe::init_local_offset();
///     // build the runtime afterwards
/// }
/// ```
pub fn init_local_offset() {
    DETECTED.call_once(|| {});
    store(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC));
}

/// Re-detect the local offset. `Ok(Some(old))` when it moved.
///
/// Detection can fail in a multi-threaded process; the cached value is then
/// kept and `Ok(None)` returned.
#[cfg_attr(not(feature = "timezone-sync"), allow(dead_code))]
pub(crate) fn refresh_local_offset() -> Result<Option<UtcOffset>, LoggerError> {
    let Ok(detected) = UtcOffset::current_local_offset() else {
        return Ok(None);
    };
    let mut guard = LOCAL_OFFSET
        .write()
        .map_err(|_| LoggerError::InvalidTimeZone("offset cache poisoned".into()))?;
    let old = *guard;
    if old == detected {
        return Ok(None);
    }
    *guard = detected;
    Ok(Some(old))
}

/// Cached local offset, detecting once on first use.
pub(crate) fn local_offset() -> UtcOffset {
    DETECTED.call_once(|| {
        if let Ok(detected) = UtcOffset::current_local_offset() {
            store(detected);
        }
    });
    LOCAL_OFFSET.read().map(|g| *g).unwrap_or(UtcOffset::UTC)
}

/// `UTC+03`, `UTC-05`, `UTC+05:30`.
#[cfg_attr(not(feature = "timezone-sync"), allow(dead_code))]
pub(crate) fn describe_offset(offset: UtcOffset) -> String {
    let (h, m, _) = offset.as_hms();
    if m == 0 {
        format!("UTC{h:+03}")
    } else {
        format!("UTC{h:+03}:{:02}", m.unsigned_abs())
    }
}

fn store(offset: UtcOffset) {
    if let Ok(mut guard) = LOCAL_OFFSET.write() {
        *guard = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zone_names() {
        assert_eq!("UTC".parse::<LoggerTimeZone>().unwrap(), LoggerTimeZone::Utc);
        assert_eq!(" local".parse::<LoggerTimeZone>().unwrap(), LoggerTimeZone::Local);
        assert!("pst".parse::<LoggerTimeZone>().is_err());
        assert!("".parse::<LoggerTimeZone>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&LoggerTimeZone::Local).unwrap(), r#""local""#);
        let tz: LoggerTimeZone = serde_json::from_str(r#""utc""#).unwrap();
        assert_eq!(tz, LoggerTimeZone::Utc);
    }

    #[test]
    fn describes_offsets() {
        assert_eq!(describe_offset(UtcOffset::UTC), "UTC+00");
        assert_eq!(describe_offset(UtcOffset::from_hms(3, 0, 0).unwrap()), "UTC+03");
        assert_eq!(describe_offset(UtcOffset::from_hms(-5, 0, 0).unwrap()), "UTC-05");
        assert_eq!(describe_offset(UtcOffset::from_hms(5, 30, 0).unwrap()), "UTC+05:30");
    }

    #[test]
    fn offset_is_plausible_after_init() {
        init_local_offset();
        assert!(local_offset().whole_hours().abs() <= 14);
    }
}
