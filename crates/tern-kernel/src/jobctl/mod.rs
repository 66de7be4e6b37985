//! Job control: OS process groups behind one contract.
//!
//! ```text
//!   create_job ──▶ Created ──add_process──▶ Populated
//!                     │                        │
//!                     │        ┌───────────────┼────────────────┐
//!                     │        ▼               ▼                ▼
//!                     │   Foreground ◀──▶ Background ◀──▶ Suspended
//!                     │        └───────────────┼────────────────┘
//!                     ▼                        ▼
//!               release/close       terminate_job │ every process reaped
//!                                       (removed)      (completed)
//! ```
//!
//! Each controller keeps its own registry behind a mutex; there is no
//! process-wide table. Control operations on a job that has no process yet
//! fail with [`JobError::InvalidId`]; operations on a job that is gone fail
//! with [`JobError::NotFound`].
//!
//! | Controller | Targets | Group identity |
//! |------------|---------|----------------|
//! | [`ProcessGroupController`] | unix | pgid of the first process, bound lazily |
//! | [`JobObjectController`] | windows | job object handle, created eagerly |
//! | [`MemoryController`] | all | fake pids, for tests |
//! | [`UnsupportedController`] | other | none |

mod memory;
mod registry;
mod unsupported;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::sync::Arc;

use tern_types::{JobError, JobId, JobSnapshot, ProcessStatus};

pub use memory::{Action, MemoryController};
pub use unsupported::UnsupportedController;

#[cfg(unix)]
pub use unix::ProcessGroupController;
#[cfg(windows)]
pub use windows::JobObjectController;

/// Groups OS processes so they can be controlled as a unit.
///
/// Methods block until the underlying OS call returns; `wait_for_job` can
/// block for as long as the processes run, so async callers should go
/// through `spawn_blocking`.
pub trait JobController: Send + Sync {
    fn create_job(&self) -> Result<JobId, JobError>;

    fn add_process(&self, id: JobId, pid: u32) -> Result<(), JobError>;

    fn bring_to_foreground(&self, id: JobId) -> Result<(), JobError>;

    fn send_to_background(&self, id: JobId) -> Result<(), JobError>;

    fn suspend_job(&self, id: JobId) -> Result<(), JobError>;

    fn resume_job(&self, id: JobId) -> Result<(), JobError>;

    /// Reap every process of the job. A process that stops instead of
    /// exiting stays in the job, which becomes suspended.
    fn wait_for_job(&self, id: JobId) -> Result<Vec<ProcessStatus>, JobError>;

    fn get_job_processes(&self, id: JobId) -> Result<Vec<u32>, JobError>;

    /// Signal every process to terminate and forget the job.
    fn terminate_job(&self, id: JobId) -> Result<(), JobError>;

    /// Forget a job whose processes were reaped elsewhere, giving the
    /// terminal back if the job had it.
    fn release_job(&self, id: JobId) -> Result<(), JobError>;

    fn inspect(&self, id: JobId) -> Result<JobSnapshot, JobError>;

    /// Forget every job. Safe to call any number of times.
    fn close(&self) -> Result<(), JobError>;
}

/// The controller for the target this was built for.
pub fn platform_controller() -> Arc<dyn JobController> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupController::new())
    }
    #[cfg(windows)]
    {
        Arc::new(JobObjectController::new())
    }
    #[cfg(not(any(unix, windows)))]
    {
        Arc::new(UnsupportedController)
    }
}
