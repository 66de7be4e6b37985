//! Controller for targets with no process-group model.

use tern_types::{JobError, JobId, JobSnapshot, ProcessStatus};

use super::JobController;

/// Every operation but `close` fails with [`JobError::NotSupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedController;

impl JobController for UnsupportedController {
    fn create_job(&self) -> Result<JobId, JobError> {
        Err(JobError::NotSupported)
    }

    fn add_process(&self, _id: JobId, _pid: u32) -> Result<(), JobError> {
        Err(JobError::NotSupported)
    }

    fn bring_to_foreground(&self, _id: JobId) -> Result<(), JobError> {
        Err(JobError::NotSupported)
    }

    fn send_to_background(&self, _id: JobId) -> Result<(), JobError> {
        Err(JobError::NotSupported)
    }

    fn suspend_job(&self, _id: JobId) -> Result<(), JobError> {
        Err(JobError::NotSupported)
    }

    fn resume_job(&self, _id: JobId) -> Result<(), JobError> {
        Err(JobError::NotSupported)
    }

    fn wait_for_job(&self, _id: JobId) -> Result<Vec<ProcessStatus>, JobError> {
        Err(JobError::NotSupported)
    }

    fn get_job_processes(&self, _id: JobId) -> Result<Vec<u32>, JobError> {
        Err(JobError::NotSupported)
    }

    fn terminate_job(&self, _id: JobId) -> Result<(), JobError> {
        Err(JobError::NotSupported)
    }

    fn release_job(&self, _id: JobId) -> Result<(), JobError> {
        Err(JobError::NotSupported)
    }

    fn inspect(&self, _id: JobId) -> Result<JobSnapshot, JobError> {
        Err(JobError::NotSupported)
    }

    fn close(&self) -> Result<(), JobError> {
        Ok(())
    }
}
