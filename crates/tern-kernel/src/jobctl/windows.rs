//! Job-object job control.
//!
//! A job is a kernel job object, created eagerly by `create_job`; processes
//! are assigned to it explicitly. There is no controlling terminal to hand
//! over, so backgrounding is a no-op and foregrounding only resumes.
//! Suspending would mean suspending every thread of every process and is
//! not implemented.

use std::sync::{Mutex, MutexGuard};

use tern_types::{JobError, JobId, JobSnapshot, JobState, ProcessStatus};
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED};
use windows_sys::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation, SetInformationJobObject,
    TerminateJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JOB_OBJECT_LIMIT_BREAKAWAY_OK,
    JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, WaitForSingleObject, INFINITE, PROCESS_QUERY_INFORMATION, PROCESS_SET_QUOTA,
    PROCESS_SYNCHRONIZE, PROCESS_TERMINATE,
};

use super::registry::Registry;
use super::JobController;

fn last_error(op: &'static str) -> JobError {
    JobError::os(op, std::io::Error::last_os_error())
}

/// A job object handle, stored as an integer so the registry is `Send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JobHandle(isize);

impl JobHandle {
    fn raw(self) -> HANDLE {
        self.0 as HANDLE
    }
}

/// A process handle closed on drop.
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    fn open(access: u32, pid: u32) -> Result<Self, JobError> {
        // SAFETY: plain FFI call; a null result is checked below.
        let h = unsafe { OpenProcess(access, 0, pid) };
        if h.is_null() {
            return Err(last_error("OpenProcess"));
        }
        Ok(Self(h))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful OpenProcess.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

pub struct JobObjectController {
    jobs: Mutex<Registry<JobHandle>>,
}

impl JobObjectController {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Registry::default()),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Registry<JobHandle>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, id: JobId) -> Result<JobHandle, JobError> {
        self.jobs().get(id)?.group.ok_or(JobError::InvalidId)
    }

    fn close_handle(handle: JobHandle) {
        // SAFETY: the handle came from CreateJobObjectW and is closed once,
        // after being removed from the registry.
        if unsafe { CloseHandle(handle.raw()) } == 0 {
            warn!("CloseHandle: {}", std::io::Error::last_os_error());
        }
    }
}

impl Default for JobObjectController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController for JobObjectController {
    fn create_job(&self) -> Result<JobId, JobError> {
        // SAFETY: null attributes and name are allowed.
        let raw = unsafe { CreateJobObjectW(std::ptr::null(), std::ptr::null()) };
        if raw.is_null() {
            return Err(last_error("CreateJobObjectW"));
        }
        let handle = JobHandle(raw as isize);
        // SAFETY: the limit structs are plain integers, for which all zeroes is valid.
        let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = unsafe { std::mem::zeroed() };
        info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_BREAKAWAY_OK | JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
        // SAFETY: `info` is a live, correctly sized struct for this class.
        let ok = unsafe {
            SetInformationJobObject(
                raw,
                JobObjectExtendedLimitInformation,
                (&info as *const JOBOBJECT_EXTENDED_LIMIT_INFORMATION).cast(),
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            )
        };
        if ok == 0 {
            let err = last_error("SetInformationJobObject");
            Self::close_handle(handle);
            return Err(err);
        }
        Ok(self.jobs().create(Some(handle)))
    }

    fn add_process(&self, id: JobId, pid: u32) -> Result<(), JobError> {
        let handle = self.handle(id)?;
        let process = ProcessHandle::open(PROCESS_SET_QUOTA | PROCESS_TERMINATE, pid)?;
        // SAFETY: both handles are open.
        if unsafe { AssignProcessToJobObject(handle.raw(), process.0) } == 0 {
            return Err(last_error("AssignProcessToJobObject"));
        }
        self.jobs().add(id, pid, handle)?;
        debug!(job = %id, pid, "process assigned");
        Ok(())
    }

    fn bring_to_foreground(&self, id: JobId) -> Result<(), JobError> {
        self.resume_job(id)?;
        self.jobs().set_state(id, JobState::Foreground)
    }

    fn send_to_background(&self, id: JobId) -> Result<(), JobError> {
        self.jobs().set_state(id, JobState::Background)
    }

    fn suspend_job(&self, id: JobId) -> Result<(), JobError> {
        self.jobs().populated(id)?;
        Err(JobError::NotImplemented("suspend_job"))
    }

    fn resume_job(&self, id: JobId) -> Result<(), JobError> {
        // nothing here ever suspends a process, so nothing needs resuming
        self.jobs().populated(id)?;
        Ok(())
    }

    fn wait_for_job(&self, id: JobId) -> Result<Vec<ProcessStatus>, JobError> {
        let pids = self.jobs().populated(id)?.pids();
        let mut statuses = Vec::with_capacity(pids.len());
        for pid in &pids {
            let pid = *pid;
            let process = match ProcessHandle::open(PROCESS_SYNCHRONIZE | PROCESS_QUERY_INFORMATION, pid) {
                Ok(p) => p,
                Err(e) => {
                    statuses.push(ProcessStatus::failed(pid, e.to_string()));
                    continue;
                }
            };
            // SAFETY: the process handle is open.
            if unsafe { WaitForSingleObject(process.0, INFINITE) } == WAIT_FAILED {
                statuses.push(ProcessStatus::failed(pid, last_error("WaitForSingleObject").to_string()));
                continue;
            }
            let mut code = 0u32;
            // SAFETY: the process handle is open and `code` is a valid out pointer.
            if unsafe { GetExitCodeProcess(process.0, &mut code) } == 0 {
                statuses.push(ProcessStatus::failed(pid, last_error("GetExitCodeProcess").to_string()));
                continue;
            }
            statuses.push(ProcessStatus::exited(pid, code as i32));
        }
        let done = self.jobs().reaped(id, &pids, false);
        if let Some(handle) = done.and_then(|entry| entry.group) {
            Self::close_handle(handle);
        }
        Ok(statuses)
    }

    fn get_job_processes(&self, id: JobId) -> Result<Vec<u32>, JobError> {
        Ok(self.jobs().populated(id)?.pids())
    }

    fn terminate_job(&self, id: JobId) -> Result<(), JobError> {
        let handle = self
            .jobs()
            .populated(id)?
            .group
            .ok_or(JobError::InvalidId)?;
        // SAFETY: the job handle is open until removed below.
        if unsafe { TerminateJobObject(handle.raw(), 1) } == 0 {
            return Err(last_error("TerminateJobObject"));
        }
        self.jobs().remove(id)?;
        Self::close_handle(handle);
        Ok(())
    }

    fn release_job(&self, id: JobId) -> Result<(), JobError> {
        let entry = self.jobs().remove(id)?;
        if let Some(handle) = entry.group {
            Self::close_handle(handle);
        }
        Ok(())
    }

    fn inspect(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.jobs().snapshot(id, |h| h.0 as i64)
    }

    fn close(&self) -> Result<(), JobError> {
        for (_, entry) in self.jobs().drain() {
            if let Some(handle) = entry.group {
                Self::close_handle(handle);
            }
        }
        Ok(())
    }
}
