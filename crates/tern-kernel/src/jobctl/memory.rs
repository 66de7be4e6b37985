//! In-memory job controller.
//!
//! Processes are fake pids handed out by [`MemoryController::spawn_fake`];
//! their outcomes are scripted with [`MemoryController::script_exit`].
//! Every control operation is appended to an action log, so tests can check
//! what a caller asked for without touching real processes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tern_types::{JobError, JobId, JobSnapshot, JobState, ProcessStatus};

use super::registry::Registry;
use super::JobController;

/// A control operation, as recorded by [`MemoryController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Foreground(JobId),
    Background(JobId),
    Suspend(JobId),
    Resume(JobId),
    Terminate(JobId),
    Release(JobId),
    Close,
}

struct Inner {
    jobs: Registry<u32>,
    /// Fake pid to its process group.
    groups: HashMap<u32, u32>,
    outcomes: HashMap<u32, ProcessStatus>,
    actions: Vec<Action>,
    next_pid: u32,
}

pub struct MemoryController {
    inner: Mutex<Inner>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: Registry::default(),
                groups: HashMap::new(),
                outcomes: HashMap::new(),
                actions: Vec::new(),
                next_pid: 1000,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A new fake process, leading its own group or joining `group`.
    pub fn spawn_fake(&self, group: Option<u32>) -> u32 {
        let mut inner = self.inner();
        let pid = inner.next_pid;
        inner.next_pid += 1;
        inner.groups.insert(pid, group.unwrap_or(pid));
        pid
    }

    /// What `wait_for_job` reports for `pid`. Unscripted processes exit 0.
    pub fn script_exit(&self, pid: u32, status: ProcessStatus) {
        self.inner().outcomes.insert(pid, status);
    }

    pub fn actions(&self) -> Vec<Action> {
        self.inner().actions.clone()
    }

    fn control(&self, id: JobId, action: Action, state: JobState) -> Result<(), JobError> {
        let mut inner = self.inner();
        inner.jobs.set_state(id, state)?;
        inner.actions.push(action);
        Ok(())
    }
}

impl Default for MemoryController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController for MemoryController {
    fn create_job(&self) -> Result<JobId, JobError> {
        Ok(self.inner().jobs.create(None))
    }

    fn add_process(&self, id: JobId, pid: u32) -> Result<(), JobError> {
        let mut inner = self.inner();
        let group = *inner
            .groups
            .get(&pid)
            .ok_or_else(|| JobError::os("getpgid", format!("no such process {pid}")))?;
        inner.jobs.add(id, pid, group)
    }

    fn bring_to_foreground(&self, id: JobId) -> Result<(), JobError> {
        self.control(id, Action::Foreground(id), JobState::Foreground)
    }

    fn send_to_background(&self, id: JobId) -> Result<(), JobError> {
        self.control(id, Action::Background(id), JobState::Background)
    }

    fn suspend_job(&self, id: JobId) -> Result<(), JobError> {
        self.control(id, Action::Suspend(id), JobState::Suspended)
    }

    fn resume_job(&self, id: JobId) -> Result<(), JobError> {
        self.control(id, Action::Resume(id), JobState::Background)
    }

    fn wait_for_job(&self, id: JobId) -> Result<Vec<ProcessStatus>, JobError> {
        let mut inner = self.inner();
        let pids = inner.jobs.populated(id)?.pids();
        let statuses: Vec<ProcessStatus> = pids
            .iter()
            .map(|pid| {
                inner
                    .outcomes
                    .get(pid)
                    .cloned()
                    .unwrap_or_else(|| ProcessStatus::exited(*pid, 0))
            })
            .collect();
        let gone: Vec<u32> = statuses.iter().filter(|s| !s.stopped).map(|s| s.pid).collect();
        let any_stopped = gone.len() < statuses.len();
        inner.jobs.reaped(id, &gone, any_stopped);
        Ok(statuses)
    }

    fn get_job_processes(&self, id: JobId) -> Result<Vec<u32>, JobError> {
        Ok(self.inner().jobs.populated(id)?.pids())
    }

    fn terminate_job(&self, id: JobId) -> Result<(), JobError> {
        let mut inner = self.inner();
        inner.jobs.populated(id)?;
        inner.jobs.remove(id)?;
        inner.actions.push(Action::Terminate(id));
        Ok(())
    }

    fn release_job(&self, id: JobId) -> Result<(), JobError> {
        let mut inner = self.inner();
        inner.jobs.remove(id)?;
        inner.actions.push(Action::Release(id));
        Ok(())
    }

    fn inspect(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.inner().jobs.snapshot(id, |g| i64::from(*g))
    }

    fn close(&self) -> Result<(), JobError> {
        let mut inner = self.inner();
        inner.jobs.drain();
        inner.actions.push(Action::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_outcomes_are_reported() {
        let jobs = MemoryController::new();
        let id = jobs.create_job().unwrap();
        let a = jobs.spawn_fake(None);
        let b = jobs.spawn_fake(Some(a));
        jobs.add_process(id, a).unwrap();
        jobs.add_process(id, b).unwrap();
        jobs.script_exit(b, ProcessStatus::exited(b, 3));

        let statuses = jobs.wait_for_job(id).unwrap();
        assert_eq!(statuses, vec![ProcessStatus::exited(a, 0), ProcessStatus::exited(b, 3)]);
        assert_eq!(jobs.get_job_processes(id), Err(JobError::AlreadyTerminated));
    }

    #[test]
    fn stopped_process_keeps_job_alive() {
        let jobs = MemoryController::new();
        let id = jobs.create_job().unwrap();
        let pid = jobs.spawn_fake(None);
        jobs.add_process(id, pid).unwrap();
        jobs.script_exit(pid, ProcessStatus::stopped(pid, 19));
        jobs.wait_for_job(id).unwrap();
        assert_eq!(jobs.inspect(id).unwrap().state, JobState::Suspended);
        assert_eq!(jobs.get_job_processes(id).unwrap(), vec![pid]);
    }

    #[test]
    fn control_actions_are_logged() {
        let jobs = MemoryController::new();
        let id = jobs.create_job().unwrap();
        let pid = jobs.spawn_fake(None);
        jobs.add_process(id, pid).unwrap();
        jobs.bring_to_foreground(id).unwrap();
        jobs.suspend_job(id).unwrap();
        jobs.resume_job(id).unwrap();
        jobs.terminate_job(id).unwrap();
        jobs.close().unwrap();
        assert_eq!(
            jobs.actions(),
            vec![
                Action::Foreground(id),
                Action::Suspend(id),
                Action::Resume(id),
                Action::Terminate(id),
                Action::Close,
            ]
        );
    }
}
