use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Defines how the executor admits a job that is already running.
///
/// Strategies:
/// - `Single`: If an instance of the same job is active, the new request is dropped
///   silently and the running instance is left untouched.
/// - `Multi`: Every request starts a fresh instance.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstancePolicy {
    /// At most one running instance per job identity.
    #[default]
    Single,
    /// Any number of concurrent instances.
    Multi,
}

impl InstancePolicy {
    pub fn allows_concurrent(&self) -> bool {
        matches!(self, InstancePolicy::Multi)
    }
}

impl FromStr for InstancePolicy {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "drop-if-running" | "" => Ok(InstancePolicy::Single),
            "multi" | "multiple" => Ok(InstancePolicy::Multi),
            other => Err(ModelError::UnknownInstancePolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single() {
        assert_eq!(InstancePolicy::default(), InstancePolicy::Single);
        assert!(!InstancePolicy::Single.allows_concurrent());
        assert!(InstancePolicy::Multi.allows_concurrent());
    }

    #[test]
    fn parses_known_names() {
        assert_eq!("multiple".parse::<InstancePolicy>().unwrap(), InstancePolicy::Multi);
        assert_eq!("Single".parse::<InstancePolicy>().unwrap(), InstancePolicy::Single);
        assert!(matches!(
            "queue".parse::<InstancePolicy>(),
            Err(ModelError::UnknownInstancePolicy(_))
        ));
    }
}
