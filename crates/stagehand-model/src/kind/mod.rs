mod runnable;
pub use runnable::RunnableKind;

mod status;
pub use status::JobStatus;
