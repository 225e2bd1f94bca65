use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("unknown runnable kind: {0}")]
    UnknownRunnableKind(String),

    #[error("unknown instance policy: {0}")]
    UnknownInstancePolicy(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
