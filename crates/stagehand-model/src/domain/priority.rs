use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Priority of an ownership claim. Higher wins.
///
/// Stored as a non-negative integer; negative input is rejected at parse and
/// deserialize time so an arbiter never sees one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u32);

impl Priority {
    /// Lowest possible claim.
    pub const MIN: Priority = Priority(0);

    /// Create a priority from an unsigned level.
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    /// Raw level.
    pub const fn level(&self) -> u32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(1)
    }
}

impl From<u32> for Priority {
    fn from(level: u32) -> Self {
        Self(level)
    }
}

impl TryFrom<i64> for Priority {
    type Error = ModelError;
    fn try_from(v: i64) -> ModelResult<Self> {
        u32::try_from(v)
            .map(Priority)
            .map_err(|_| ModelError::InvalidPriority(v.to_string()))
    }
}

impl From<Priority> for i64 {
    fn from(p: Priority) -> Self {
        i64::from(p.0)
    }
}

impl FromStr for Priority {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        let v: i64 = s
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidPriority(s.to_string()))?;
        Priority::try_from(v)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_one() {
        assert_eq!(Priority::default().level(), 1);
    }

    #[test]
    fn ordering_follows_level() {
        assert!(Priority::new(5) > Priority::new(1));
        assert!(Priority::MIN < Priority::default());
    }

    #[test]
    fn parse_rejects_negative_and_garbage() {
        assert_eq!("7".parse::<Priority>().unwrap(), Priority::new(7));
        assert!(matches!(
            "-1".parse::<Priority>(),
            Err(ModelError::InvalidPriority(_))
        ));
        assert!("high".parse::<Priority>().is_err());
    }

    #[test]
    fn serde_is_a_plain_number() {
        let json = serde_json::to_string(&Priority::new(3)).unwrap();
        assert_eq!(json, "3");

        let back: Priority = serde_json::from_str("3").unwrap();
        assert_eq!(back, Priority::new(3));
        assert!(serde_json::from_str::<Priority>("-4").is_err());
    }
}
