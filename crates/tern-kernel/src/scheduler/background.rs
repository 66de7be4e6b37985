use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tern_types::JobId;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::eval::{ExecResult, Exception};

/// Status of a background pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundStatus {
    Running,
    Done,
    /// Ended with an exception; holds its message.
    Failed(String),
}

impl fmt::Display for BackgroundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundStatus::Running => write!(f, "Running"),
            BackgroundStatus::Done => write!(f, "Done"),
            BackgroundStatus::Failed(msg) => write!(f, "Failed: {msg}"),
        }
    }
}

/// A row of [`BackgroundJobs::list`].
#[derive(Debug, Clone)]
pub struct BackgroundInfo {
    pub id: JobId,
    /// Source text of the pipeline, without the trailing `&`.
    pub command: String,
    /// The OS job its external commands joined, under job control.
    pub os_job: Option<JobId>,
    pub status: BackgroundStatus,
}

struct Entry {
    command: String,
    os_job: Option<JobId>,
    cancel: CancellationToken,
    done: Shared<BoxFuture<'static, ExecResult<()>>>,
    result: Option<ExecResult<()>>,
}

impl Entry {
    fn status(&self) -> BackgroundStatus {
        match &self.result {
            None => BackgroundStatus::Running,
            Some(Ok(())) => BackgroundStatus::Done,
            Some(Err(e)) => BackgroundStatus::Failed(e.to_string()),
        }
    }

    fn info(&self, id: JobId) -> BackgroundInfo {
        BackgroundInfo {
            id,
            command: self.command.clone(),
            os_job: self.os_job,
            status: self.status(),
        }
    }
}

#[derive(Default)]
struct Table {
    next: u64,
    jobs: BTreeMap<JobId, Entry>,
}

/// Background pipelines of one evaler, numbered from 1.
#[derive(Clone, Default)]
pub struct BackgroundJobs {
    table: Arc<Mutex<Table>>,
}

impl BackgroundJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start `future` on the runtime and track it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, command: String, os_job: Option<JobId>, cancel: CancellationToken, future: F) -> JobId
    where
        F: Future<Output = ExecResult<()>> + Send + 'static,
    {
        let mut table = self.table();
        table.next += 1;
        let id = JobId::from_raw(table.next);

        let tracked = self.table.clone();
        let handle = tokio::spawn(async move {
            let result = future.await;
            match &result {
                Ok(()) => debug!(job = %id, "background job done"),
                Err(e) => debug!(job = %id, "background job failed: {e}"),
            }
            let mut table = tracked.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = table.jobs.get_mut(&id) {
                entry.result = Some(result.clone());
            }
            result
        });
        let done = handle
            .map(|joined| joined.unwrap_or_else(|e| Err(Exception::fail(format!("job panicked: {e}")))))
            .boxed()
            .shared();

        table.jobs.insert(
            id,
            Entry {
                command,
                os_job,
                cancel,
                done,
                result: None,
            },
        );
        id
    }

    /// Wait for a job to finish. `None` if there is no such job.
    ///
    /// Any number of callers may wait on the same job.
    pub async fn wait(&self, id: JobId) -> Option<ExecResult<()>> {
        let done = {
            let table = self.table();
            let entry = table.jobs.get(&id)?;
            if let Some(result) = &entry.result {
                return Some(result.clone());
            }
            entry.done.clone()
        };
        Some(done.await)
    }

    /// Wait for a job to finish and forget it. `None` if there is no such
    /// job, or another caller took it first.
    pub async fn take(&self, id: JobId) -> Option<ExecResult<()>> {
        let result = self.wait(id).await?;
        self.table().jobs.remove(&id)?;
        Some(result)
    }

    /// Wait for every job, in id order.
    pub async fn wait_all(&self) -> Vec<(JobId, ExecResult<()>)> {
        let ids: Vec<JobId> = self.table().jobs.keys().copied().collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(result) = self.wait(id).await {
                results.push((id, result));
            }
        }
        results
    }

    pub fn get(&self, id: JobId) -> Option<BackgroundInfo> {
        self.table().jobs.get(&id).map(|e| e.info(id))
    }

    pub fn list(&self) -> Vec<BackgroundInfo> {
        self.table().jobs.iter().map(|(id, e)| e.info(*id)).collect()
    }

    pub fn running_count(&self) -> usize {
        self.table().jobs.values().filter(|e| e.result.is_none()).count()
    }

    /// Cancel one job. Returns whether it existed.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.table().jobs.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.table().jobs.values() {
            entry.cancel.cancel();
        }
    }

    /// Forget finished jobs.
    pub fn cleanup(&self) {
        self.table().jobs.retain(|_, e| e.result.is_none());
    }
}
