//! Process-group job control.
//!
//! A job is a process group. `create_job` hands out a placeholder; the
//! first `add_process` binds it to that process's pgid, and later processes
//! must already be in the same group.

use std::sync::{Mutex, MutexGuard};

use nix::sys::signal::{killpg, pthread_sigmask, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpgid, getpgrp, tcsetpgrp, Pid};
use tern_types::{JobError, JobId, JobSnapshot, JobState, ProcessStatus};
use tracing::{debug, warn};

use super::registry::Registry;
use super::JobController;

pub struct ProcessGroupController {
    jobs: Mutex<Registry<i32>>,
    /// The group that owns the terminal when no job does.
    shell_pgid: Pid,
}

impl ProcessGroupController {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Registry::default()),
            shell_pgid: getpgrp(),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Registry<i32>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The bound pgid of a populated job.
    fn group(&self, id: JobId) -> Result<Pid, JobError> {
        let jobs = self.jobs();
        let entry = jobs.populated(id)?;
        entry.group.map(Pid::from_raw).ok_or(JobError::InvalidId)
    }

    fn signal(&self, id: JobId, signal: Signal) -> Result<(), JobError> {
        let pgid = self.group(id)?;
        debug!(job = %id, pgid = pgid.as_raw(), ?signal, "signalling job");
        killpg(pgid, signal).map_err(|e| JobError::os("killpg", e))
    }

    /// Give the terminal to `pgid`.
    ///
    /// SIGTTOU is blocked for the call: a shell outside the foreground group
    /// would otherwise be stopped for touching the terminal.
    fn give_terminal(&self, pgid: Pid) -> Result<(), JobError> {
        let mut ttou = SigSet::empty();
        ttou.add(Signal::SIGTTOU);
        let mut old = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&ttou), Some(&mut old))
            .map_err(|e| JobError::os("pthread_sigmask", e))?;
        let result = tcsetpgrp(std::io::stdin(), pgid).map_err(|e| JobError::os("tcsetpgrp", e));
        if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&old), None) {
            warn!("restoring signal mask: {e}");
        }
        result
    }

    fn reclaim_terminal(&self) {
        if let Err(e) = self.give_terminal(self.shell_pgid) {
            warn!("failed to reclaim terminal: {e}");
        }
    }
}

impl Default for ProcessGroupController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController for ProcessGroupController {
    fn create_job(&self) -> Result<JobId, JobError> {
        Ok(self.jobs().create(None))
    }

    fn add_process(&self, id: JobId, pid: u32) -> Result<(), JobError> {
        let raw = i32::try_from(pid).map_err(|_| JobError::InvalidId)?;
        let pgid = getpgid(Some(Pid::from_raw(raw))).map_err(|e| JobError::os("getpgid", e))?;
        self.jobs().add(id, pid, pgid.as_raw())?;
        debug!(job = %id, pid, pgid = pgid.as_raw(), "process added");
        Ok(())
    }

    fn bring_to_foreground(&self, id: JobId) -> Result<(), JobError> {
        let pgid = self.group(id)?;
        self.give_terminal(pgid)?;
        killpg(pgid, Signal::SIGCONT).map_err(|e| JobError::os("killpg", e))?;
        self.jobs().set_state(id, JobState::Foreground)
    }

    fn send_to_background(&self, id: JobId) -> Result<(), JobError> {
        let pgid = self.group(id)?;
        self.give_terminal(self.shell_pgid)?;
        killpg(pgid, Signal::SIGCONT).map_err(|e| JobError::os("killpg", e))?;
        self.jobs().set_state(id, JobState::Background)
    }

    fn suspend_job(&self, id: JobId) -> Result<(), JobError> {
        self.signal(id, Signal::SIGSTOP)?;
        self.jobs().set_state(id, JobState::Suspended)
    }

    fn resume_job(&self, id: JobId) -> Result<(), JobError> {
        self.signal(id, Signal::SIGCONT)?;
        self.jobs().set_state(id, JobState::Background)
    }

    fn wait_for_job(&self, id: JobId) -> Result<Vec<ProcessStatus>, JobError> {
        // the lock is released while blocked in waitpid
        let (pids, foreground) = {
            let jobs = self.jobs();
            let entry = jobs.populated(id)?;
            (entry.pids(), entry.state == JobState::Foreground)
        };
        let mut statuses = Vec::with_capacity(pids.len());
        let mut gone = Vec::new();
        let mut any_stopped = false;
        for pid in pids {
            let status = match waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Exited(_, code)) => ProcessStatus::exited(pid, code),
                Ok(WaitStatus::Signaled(_, signal, _)) => ProcessStatus::signaled(pid, signal as i32),
                Ok(WaitStatus::Stopped(_, signal)) => ProcessStatus::stopped(pid, signal as i32),
                Ok(other) => ProcessStatus::failed(pid, format!("unexpected wait status {other:?}")),
                Err(e) => ProcessStatus::failed(pid, e.to_string()),
            };
            if status.stopped {
                any_stopped = true;
            } else {
                gone.push(pid);
            }
            statuses.push(status);
        }
        self.jobs().reaped(id, &gone, any_stopped);
        // done or stopped, the job no longer runs in the foreground
        if foreground {
            self.reclaim_terminal();
        }
        Ok(statuses)
    }

    fn get_job_processes(&self, id: JobId) -> Result<Vec<u32>, JobError> {
        Ok(self.jobs().populated(id)?.pids())
    }

    fn terminate_job(&self, id: JobId) -> Result<(), JobError> {
        let pgid = self.group(id)?;
        match killpg(pgid, Signal::SIGTERM) {
            // the whole group already exited
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => return Err(JobError::os("killpg", e)),
        }
        let entry = self.jobs().remove(id)?;
        if entry.state == JobState::Foreground {
            self.reclaim_terminal();
        }
        debug!(job = %id, "terminated");
        Ok(())
    }

    fn release_job(&self, id: JobId) -> Result<(), JobError> {
        let entry = self.jobs().remove(id)?;
        if entry.state == JobState::Foreground {
            self.reclaim_terminal();
        }
        Ok(())
    }

    fn inspect(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.jobs().snapshot(id, |g| i64::from(*g))
    }

    fn close(&self) -> Result<(), JobError> {
        let drained = self.jobs().drain();
        if drained.iter().any(|(_, e)| e.state == JobState::Foreground) {
            self.reclaim_terminal();
        }
        Ok(())
    }
}
