use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Startup class of a runnable.
///
/// The executor starts runnables class by class so that outputs settle into a
/// known state before any input is armed:
/// `Logical` → device initial state → `OutputHardware` → `InputHardware` → `Other`.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunnableKind {
    /// Software-only output (virtual fixtures, mirrors, loggers).
    Logical,
    /// Output that drives real hardware.
    OutputHardware,
    /// Input that may react as soon as it is started.
    InputHardware,
    /// Anything else, started last.
    #[default]
    Other,
}

impl RunnableKind {
    /// Return the lowercase label used in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RunnableKind::Logical => "logical",
            RunnableKind::OutputHardware => "output-hardware",
            RunnableKind::InputHardware => "input-hardware",
            RunnableKind::Other => "other",
        }
    }
}

impl FromStr for RunnableKind {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logical" => Ok(RunnableKind::Logical),
            "output-hardware" | "output" => Ok(RunnableKind::OutputHardware),
            "input-hardware" | "input" => Ok(RunnableKind::InputHardware),
            "other" | "" => Ok(RunnableKind::Other),
            other => Err(ModelError::UnknownRunnableKind(other.to_string())),
        }
    }
}

impl fmt::Display for RunnableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
