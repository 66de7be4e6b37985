//! The job table shared by every controller implementation.

use std::collections::{BTreeSet, HashMap, HashSet};

use tern_types::{JobError, JobId, JobSnapshot, JobState};

pub(crate) struct Entry<G> {
    pub(crate) state: JobState,
    /// `None` until bound, for controllers that bind lazily.
    pub(crate) group: Option<G>,
    pub(crate) pids: BTreeSet<u32>,
}

impl<G> Entry<G> {
    pub(crate) fn pids(&self) -> Vec<u32> {
        self.pids.iter().copied().collect()
    }
}

/// Registered jobs, plus the ids of jobs that ran to completion so that
/// late operations on them can say so.
pub(crate) struct Registry<G> {
    next: u64,
    jobs: HashMap<JobId, Entry<G>>,
    completed: HashSet<JobId>,
}

impl<G> Default for Registry<G> {
    fn default() -> Self {
        Self {
            next: 1,
            jobs: HashMap::new(),
            completed: HashSet::new(),
        }
    }
}

impl<G> Registry<G> {
    pub(crate) fn create(&mut self, group: Option<G>) -> JobId {
        let id = JobId::from_raw(self.next);
        self.next += 1;
        self.jobs.insert(
            id,
            Entry {
                state: JobState::Created,
                group,
                pids: BTreeSet::new(),
            },
        );
        id
    }

    fn missing(&self, id: JobId) -> JobError {
        if self.completed.contains(&id) {
            JobError::AlreadyTerminated
        } else {
            JobError::NotFound
        }
    }

    pub(crate) fn get(&self, id: JobId) -> Result<&Entry<G>, JobError> {
        self.jobs.get(&id).ok_or_else(|| self.missing(id))
    }

    pub(crate) fn get_mut(&mut self, id: JobId) -> Result<&mut Entry<G>, JobError> {
        let err = self.missing(id);
        self.jobs.get_mut(&id).ok_or(err)
    }

    /// A job with at least one process.
    pub(crate) fn populated(&self, id: JobId) -> Result<&Entry<G>, JobError> {
        let entry = self.get(id)?;
        if !entry.state.is_populated() {
            return Err(JobError::InvalidId);
        }
        Ok(entry)
    }

    pub(crate) fn populated_mut(&mut self, id: JobId) -> Result<&mut Entry<G>, JobError> {
        let entry = self.get_mut(id)?;
        if !entry.state.is_populated() {
            return Err(JobError::InvalidId);
        }
        Ok(entry)
    }

    pub(crate) fn set_state(&mut self, id: JobId, state: JobState) -> Result<(), JobError> {
        self.populated_mut(id)?.state = state;
        Ok(())
    }

    /// Record a new member, binding the group if the job has none yet.
    pub(crate) fn add(&mut self, id: JobId, pid: u32, group: G) -> Result<(), JobError>
    where
        G: PartialEq,
    {
        let entry = self.get_mut(id)?;
        match &entry.group {
            Some(g) if *g != group => return Err(JobError::ProcessNotInJob),
            Some(_) => {}
            None => entry.group = Some(group),
        }
        entry.pids.insert(pid);
        if entry.state == JobState::Created {
            entry.state = JobState::Populated;
        }
        Ok(())
    }

    /// Drop reaped pids. A job with nothing left is completed and its entry
    /// is handed back so the caller can release its group; one with only
    /// stopped processes left is suspended.
    pub(crate) fn reaped(&mut self, id: JobId, gone: &[u32], any_stopped: bool) -> Option<Entry<G>> {
        let entry = self.jobs.get_mut(&id)?;
        for pid in gone {
            entry.pids.remove(pid);
        }
        if entry.pids.is_empty() {
            self.completed.insert(id);
            return self.jobs.remove(&id);
        }
        if any_stopped {
            entry.state = JobState::Suspended;
        }
        None
    }

    pub(crate) fn remove(&mut self, id: JobId) -> Result<Entry<G>, JobError> {
        self.completed.remove(&id);
        let err = self.missing(id);
        self.jobs.remove(&id).ok_or(err)
    }

    pub(crate) fn drain(&mut self) -> Vec<(JobId, Entry<G>)> {
        self.completed.clear();
        self.jobs.drain().collect()
    }

    pub(crate) fn snapshot(&self, id: JobId, raw: impl Fn(&G) -> i64) -> Result<JobSnapshot, JobError> {
        let entry = self.get(id)?;
        Ok(JobSnapshot {
            id,
            state: entry.state,
            group: entry.group.as_ref().map(raw),
            pids: entry.pids(),
        })
    }
}
