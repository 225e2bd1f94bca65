use std::{error::Error, fmt, sync::Arc};

use thiserror::Error;

/// Error recorded by [`crate::cell::BroadcastCell::fail`].
///
/// Cheap to clone so every observer and every later `read` sees the same error.
#[derive(Clone)]
pub struct CellFailure(Arc<dyn Error + Send + Sync>);

impl CellFailure {
    pub fn new<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Build a failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    pub fn inner(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for CellFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellFailure").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for CellFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for Message {}

#[derive(Debug, Clone, Error)]
pub enum CellError {
    /// The cell was torn down with `dispose`.
    #[error("cell is disposed")]
    Disposed,

    /// The cell was created empty and has not been set yet.
    #[error("cell has no value")]
    Empty,

    /// The cell was failed; the recorded error is re-raised.
    #[error("cell failed: {0}")]
    Failed(CellFailure),
}

impl CellError {
    pub fn as_label(&self) -> &'static str {
        match self {
            CellError::Disposed => "disposed",
            CellError::Empty => "empty",
            CellError::Failed(_) => "failed",
        }
    }
}
