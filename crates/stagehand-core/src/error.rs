use thiserror::Error;

use stagehand_model::ModelError;

use crate::cell::CellError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} already registered: {name}")]
    AlreadyRegistered { kind: &'static str, name: String },

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("cell error: {0}")]
    Cell(#[from] CellError),
}

impl CoreError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CoreError::AlreadyRegistered { .. } => "already_registered",
            CoreError::NoRuntime => "no_runtime",
            CoreError::Model(_) => "model",
            CoreError::Cell(_) => "cell",
        }
    }
}
