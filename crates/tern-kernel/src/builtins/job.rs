//! Job builtins.

use async_trait::async_trait;
use tern_types::{JobError, JobId, ProcessStatus};
use tracing::debug;

use super::{Builtin, CallArgs};
use crate::eval::{Cause, ExecResult, Exception, Frame, NsBuilder, PipelineError, Value};
use crate::jobctl::JobController;

pub(crate) fn register(b: NsBuilder) -> NsBuilder {
    b.add_fn(Fg)
}

/// `fg pid...` puts the processes into a new job, gives it the terminal and
/// waits for it. `fg %N...` waits for background pipelines.
///
/// Each waited process or pipeline is one entry of the resulting pipeline
/// error, so `fg` fails the way a pipeline of them would.
pub struct Fg;

enum Target {
    Pid(u32),
    Background(JobId),
}

fn target(v: &Value) -> Result<Target, Cause> {
    let text = v.to_str();
    if let Some(n) = text.strip_prefix('%') {
        let n: u64 = n.parse().map_err(|_| Cause::bad_value("job", "%N", text.clone()))?;
        return Ok(Target::Background(JobId::from_raw(n)));
    }
    let pid = v.as_int("pid")?;
    u32::try_from(pid)
        .map(Target::Pid)
        .map_err(|_| Cause::bad_value("pid", "positive integer", text))
}

#[async_trait]
impl Builtin for Fg {
    fn name(&self) -> &str {
        "fg"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, None)?;
        args.only_opts(&[])?;
        let targets = args.args.iter().map(target).collect::<Result<Vec<_>, _>>()?;

        let mut pids = Vec::new();
        let mut background = Vec::new();
        for t in targets {
            match t {
                Target::Pid(pid) => pids.push(pid),
                Target::Background(id) => background.push(id),
            }
        }
        if !pids.is_empty() && !background.is_empty() {
            return Err(Exception::fail("fg takes either pids or %N jobs, not both"));
        }

        if !background.is_empty() {
            return wait_background(frame, &background).await;
        }

        let jobs = frame.job_controller().clone();
        let statuses = tokio::task::spawn_blocking(move || foreground_pids(jobs.as_ref(), &pids))
            .await
            .map_err(|e| Exception::fail(format!("fg: {e}")))??;
        PipelineError::collapse(statuses.iter().map(status_exception).collect())
    }
}

async fn wait_background(frame: &Frame, ids: &[JobId]) -> ExecResult<()> {
    let table = &frame.evaler.background;
    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let info = table.get(*id).ok_or(JobError::NotFound)?;
        if frame.evaler.config.interactive {
            if let Some(os_job) = info.os_job {
                // a job with no external process yet has no group to hand the terminal to
                if let Err(e) = frame.job_controller().bring_to_foreground(os_job) {
                    debug!(job = %id, "not foregrounded: {e}");
                }
            }
        }
        // waited for once; the entry goes with its result
        let result = table.take(*id).await.ok_or(JobError::NotFound)?;
        results.push(result.err());
    }
    PipelineError::collapse(results)
}

/// Group `pids` into a new job, foreground it and wait for every process.
fn foreground_pids(jobs: &dyn JobController, pids: &[u32]) -> Result<Vec<ProcessStatus>, JobError> {
    let id = jobs.create_job()?;
    for pid in pids {
        if let Err(e) = jobs.add_process(id, *pid) {
            // the processes stay untouched; only the registry entry goes
            if let Err(c) = jobs.release_job(id) {
                debug!(job = %id, "release after failed add: {c}");
            }
            return Err(e);
        }
    }
    jobs.bring_to_foreground(id)?;
    jobs.wait_for_job(id)
}

/// The exception a waited process contributes, `None` on success.
pub(crate) fn status_exception(status: &ProcessStatus) -> Option<Exception> {
    let cmd = format!("[pid {}]", status.pid);
    let cause = match status {
        s if s.success() => return None,
        ProcessStatus { error: Some(msg), .. } => Cause::Fail(msg.clone()),
        ProcessStatus { stopped: true, exit_code, .. } => Cause::Fail(format!("{cmd} stopped by signal {exit_code}")),
        ProcessStatus { terminated: true, exit_code, .. } => Cause::ExternalSignaled {
            cmd,
            pid: status.pid,
            signal: *exit_code,
        },
        ProcessStatus { exit_code, .. } => Cause::ExternalExit {
            cmd,
            pid: status.pid,
            code: *exit_code,
        },
    };
    Some(Exception::new(cause))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EvalerConfig;
    use crate::jobctl::{Action, MemoryController};
    use crate::{EvalError, Evaler};

    #[test]
    fn status_mapping() {
        assert!(status_exception(&ProcessStatus::exited(1, 0)).is_none());
        let e = status_exception(&ProcessStatus::exited(7, 2)).unwrap();
        assert!(matches!(e.cause, Cause::ExternalExit { pid: 7, code: 2, .. }));
        let e = status_exception(&ProcessStatus::signaled(7, 9)).unwrap();
        assert!(matches!(e.cause, Cause::ExternalSignaled { signal: 9, .. }));
        let e = status_exception(&ProcessStatus::failed(7, "gone")).unwrap();
        assert_eq!(e.to_string(), "gone");
    }

    #[tokio::test]
    async fn fg_pids_reports_each_process() {
        let jobs = Arc::new(MemoryController::new());
        let a = jobs.spawn_fake(None);
        let b = jobs.spawn_fake(Some(a));
        jobs.script_exit(b, ProcessStatus::exited(b, 3));
        let ev = Evaler::with_job_controller(EvalerConfig::transient(), jobs.clone());

        let out = ev.eval_capture("t", &format!("fg {a} {b}")).await;
        let Err(EvalError::Exception(e)) = out.result else {
            panic!("expected an exception");
        };
        let Cause::Pipeline(p) = &e.cause else {
            panic!("expected a pipeline error, got {e}");
        };
        assert_eq!(p.len(), 2);
        assert_eq!(p.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);
        assert!(jobs.actions().contains(&Action::Foreground(JobId::from_raw(1))));
    }

    #[tokio::test]
    async fn fg_unknown_pid_cleans_up() {
        let jobs = Arc::new(MemoryController::new());
        let ev = Evaler::with_job_controller(EvalerConfig::transient(), jobs.clone());
        let out = ev.eval_capture("t", "fg 424242").await;
        assert!(out.result.is_err());
        assert_eq!(jobs.actions(), vec![Action::Release(JobId::from_raw(1))]);
    }

    #[tokio::test]
    async fn fg_mixed_groups_leaves_processes_alone() {
        let jobs = Arc::new(MemoryController::new());
        let a = jobs.spawn_fake(None);
        let b = jobs.spawn_fake(None);
        let ev = Evaler::with_job_controller(EvalerConfig::transient(), jobs.clone());

        let out = ev.eval_capture("t", &format!("fg {a} {b}")).await;
        let Err(EvalError::Exception(e)) = out.result else {
            panic!("expected an exception");
        };
        assert!(matches!(e.cause, Cause::Job(JobError::ProcessNotInJob)));
        assert_eq!(jobs.actions(), vec![Action::Release(JobId::from_raw(1))]);
    }

    #[tokio::test]
    async fn fg_waits_for_background_pipeline() {
        let ev = Evaler::transient();
        ev.eval_capture("t", "var x = 0; fn work { sleep 10ms; set x = 1 }; work &").await.result.unwrap();
        ev.eval_capture("t", "fg %1").await.result.unwrap();
        assert_eq!(ev.global("x"), Some(Value::str("1")));
        assert!(ev.background().list().is_empty());
        assert!(ev.eval_capture("t", "fg %1").await.result.is_err());

        let out = ev.eval_capture("t", "fail bg &").await;
        out.result.unwrap();
        assert_eq!(ev.eval_capture("t", "fg %2").await.result.unwrap_err().to_string(), "bg");
        assert!(ev.eval_capture("t", "fg %9").await.result.is_err());
    }
}
