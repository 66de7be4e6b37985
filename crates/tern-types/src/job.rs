//! Job-control identification, status and error types.

use serde::Serialize;
use thiserror::Error;

/// Opaque handle to a job, issued by the job controller that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl JobId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Where a live job is in its lifecycle.
///
/// Terminated and completed jobs are no longer registered, so they have no
/// state here; asking about them yields [`JobError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Created, no process added yet.
    Created,
    /// At least one process added, never moved.
    Populated,
    Foreground,
    Background,
    Suspended,
}

impl JobState {
    pub fn is_populated(&self) -> bool {
        !matches!(self, JobState::Created)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "Created"),
            JobState::Populated => write!(f, "Populated"),
            JobState::Foreground => write!(f, "Foreground"),
            JobState::Background => write!(f, "Background"),
            JobState::Suspended => write!(f, "Suspended"),
        }
    }
}

/// Outcome of one process reaped by a job wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    pub pid: u32,
    /// Exit status, or the signal number when `terminated` is set.
    pub exit_code: i32,
    /// Killed by a signal rather than exiting.
    pub terminated: bool,
    /// Stopped (not exited); the process stays in the job.
    pub stopped: bool,
    pub error: Option<String>,
}

impl ProcessStatus {
    pub fn exited(pid: u32, exit_code: i32) -> Self {
        Self {
            pid,
            exit_code,
            terminated: false,
            stopped: false,
            error: None,
        }
    }

    pub fn signaled(pid: u32, signal: i32) -> Self {
        Self {
            pid,
            exit_code: signal,
            terminated: true,
            stopped: false,
            error: None,
        }
    }

    pub fn stopped(pid: u32, signal: i32) -> Self {
        Self {
            pid,
            exit_code: signal,
            terminated: false,
            stopped: true,
            error: None,
        }
    }

    pub fn failed(pid: u32, error: impl Into<String>) -> Self {
        Self {
            pid,
            exit_code: -1,
            terminated: false,
            stopped: false,
            error: Some(error.into()),
        }
    }

    /// Exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.terminated && !self.stopped && self.error.is_none()
    }
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    /// Platform group identity; `None` while a lazily bound job is a placeholder.
    pub group: Option<i64>,
    pub pids: Vec<u32>,
}

/// Job-control failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job not found")]
    NotFound,
    #[error("invalid job ID")]
    InvalidId,
    #[error("process not in job")]
    ProcessNotInJob,
    #[error("job already terminated")]
    AlreadyTerminated,
    #[error("job control not supported on this platform")]
    NotSupported,
    #[error("{0} not implemented on this platform")]
    NotImplemented(&'static str),
    #[error("{op}: {message}")]
    Os { op: &'static str, message: String },
}

impl JobError {
    pub fn os(op: &'static str, err: impl std::fmt::Display) -> Self {
        JobError::Os {
            op,
            message: err.to_string(),
        }
    }
}
