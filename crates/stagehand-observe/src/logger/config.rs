use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::object::{LoggerFormat, LoggerLevel, LoggerTimeZone};

/// How the process logs. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` expression, e.g. `"info"` or `"stagehand_core=debug,info"`.
    pub level: LoggerLevel,
    /// Zone used for timestamps.
    pub tz: LoggerTimeZone,
    pub with_targets: bool,
    /// Sweeper ticks run on blocking threads; naming them helps when reading timing logs.
    pub with_thread_names: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            tz: LoggerTimeZone::default(),
            with_targets: true,
            with_thread_names: false,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    /// Color only when asked for and stdout is a terminal.
    ///
    /// Evaluated at install time, not when the config is parsed.
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LoggerConfig::default();

        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.tz, LoggerTimeZone::Utc);
        assert_eq!(cfg.level.as_str(), "info");
        assert!(cfg.with_targets);
        assert!(!cfg.with_thread_names);
        assert!(cfg.use_color);
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: LoggerConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(cfg.format, LoggerFormat::default());
        assert_eq!(cfg.tz, LoggerTimeZone::default());
        assert_eq!(cfg.level.as_str(), "info");
        assert!(cfg.use_color);
    }

    #[test]
    fn camel_case_fields() {
        let json = r#"{"format": "json", "level": "stagehand_core=trace,warn", "tz": "local", "withThreadNames": true, "useColor": false}"#;
        let cfg: LoggerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.tz, LoggerTimeZone::Local);
        assert_eq!(cfg.level.as_str(), "stagehand_core=trace,warn");
        assert!(cfg.with_thread_names);
        assert!(!cfg.use_color);
        assert!(!cfg.should_use_color());
        assert!(cfg.with_targets);
    }

    #[test]
    fn bad_level_is_rejected_at_parse_time() {
        let json = r#"{"level": "stagehand_core=loud"}"#;
        assert!(serde_json::from_str::<LoggerConfig>(json).is_err());
    }
}
