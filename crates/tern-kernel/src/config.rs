//! Evaluator configuration.

use std::path::PathBuf;

use crate::eval::DEFAULT_PIPE_CAPACITY;
use crate::paths;

/// Values buffered between two pipeline stages before the sender waits.
pub const DEFAULT_VALUE_CAPACITY: usize = 32;

/// Configuration for an [`Evaler`](crate::Evaler).
#[derive(Debug, Clone)]
pub struct EvalerConfig {
    /// Name of this evaluator, used in logs.
    pub name: String,

    /// A human is at the terminal: values print as `▶ repr` and foreground
    /// jobs get the terminal.
    pub interactive: bool,

    /// Put each pipeline's external commands into an OS job.
    pub job_control: bool,

    /// Capacity of the value channel between stages.
    pub value_capacity: usize,

    /// Capacity in bytes of the byte pipe between stages.
    pub pipe_capacity: usize,

    /// rc file loaded by [`Evaler::load_rc`](crate::Evaler::load_rc).
    pub rc_path: Option<PathBuf>,
}

impl Default for EvalerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            interactive: false,
            job_control: false,
            value_capacity: DEFAULT_VALUE_CAPACITY,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            rc_path: None,
        }
    }
}

impl EvalerConfig {
    /// Throwaway evaluator for tests and embedding: no rc, no job control.
    pub fn transient() -> Self {
        Self {
            name: "transient".to_string(),
            ..Self::default()
        }
    }

    /// Running a script file.
    pub fn script() -> Self {
        Self {
            name: "script".to_string(),
            ..Self::default()
        }
    }

    /// An interactive session with job control and the user's rc file.
    pub fn interactive() -> Self {
        Self {
            name: "interactive".to_string(),
            interactive: true,
            job_control: true,
            rc_path: Some(paths::rc_path()),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
