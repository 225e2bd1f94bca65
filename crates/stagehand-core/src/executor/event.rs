use std::{fmt, sync::Arc};

/// What happened to a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventKind {
    Started,
    Completed,
    Cancelled,
    Faulted,
    /// Single-instance job submitted while already running.
    Skipped,
}

impl JobEventKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            JobEventKind::Started => "started",
            JobEventKind::Completed => "completed",
            JobEventKind::Cancelled => "cancelled",
            JobEventKind::Faulted => "faulted",
            JobEventKind::Skipped => "skipped",
        }
    }
}

/// Lifecycle notification published on [`Executor::events`](crate::executor::Executor::events).
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job: Arc<str>,
    /// Absent for `Skipped`: no instance was created.
    pub instance: Option<u64>,
    pub reason: Option<String>,
    pub elapsed_ms: Option<u64>,
}

impl JobEvent {
    pub(crate) fn started(job: Arc<str>, instance: u64) -> Self {
        Self {
            kind: JobEventKind::Started,
            job,
            instance: Some(instance),
            reason: None,
            elapsed_ms: None,
        }
    }

    pub(crate) fn finished(
        kind: JobEventKind,
        job: Arc<str>,
        instance: u64,
        elapsed_ms: u64,
        reason: Option<String>,
    ) -> Self {
        Self {
            kind,
            job,
            instance: Some(instance),
            reason,
            elapsed_ms: Some(elapsed_ms),
        }
    }

    pub(crate) fn skipped(job: Arc<str>) -> Self {
        Self {
            kind: JobEventKind::Skipped,
            job,
            instance: None,
            reason: Some("already running".into()),
            elapsed_ms: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            JobEventKind::Completed | JobEventKind::Cancelled | JobEventKind::Faulted
        )
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.job, self.kind.as_label())?;
        if let Some(instance) = self.instance {
            write!(f, " #{instance}")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}
