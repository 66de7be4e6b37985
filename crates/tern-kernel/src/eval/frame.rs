//! Execution context.

use std::sync::Arc;

use futures::future::BoxFuture;
use tern_types::{JobId, Source};
use tokio_util::sync::CancellationToken;

use super::exception::{Cause, ExecResult, Exception};
use super::ns::Cell;
use super::port::{Inputs, Ports};
use super::value::Value;
use crate::compile::VarRef;
use crate::evaler::EvalerInner;
use crate::jobctl::JobController;

/// The OS job a pipeline's external commands join.
///
/// Stages of one pipeline, and pipelines nested in them, share the slot so
/// that every process lands in the process group of the first one spawned.
/// Once every process of that group has exited the group is gone; the next
/// spawn then starts a fresh group in a fresh job, recorded here so all of
/// them are released together.
#[derive(Clone)]
pub(crate) struct PipelineJob {
    slot: Arc<std::sync::Mutex<JobSlot>>,
}

pub(crate) struct JobSlot {
    /// The job new processes join.
    pub(crate) current: JobId,
    /// Group of `current`, once its first process is spawned.
    pub(crate) group: Option<u32>,
    /// Every job created for the pipeline, `current` included.
    pub(crate) created: Vec<JobId>,
}

impl JobSlot {
    /// Switch to a freshly created job with no group yet.
    pub(crate) fn restart(&mut self, id: JobId) {
        self.current = id;
        self.group = None;
        self.created.push(id);
    }
}

impl PipelineJob {
    pub(crate) fn new(id: JobId) -> Self {
        Self {
            slot: Arc::new(std::sync::Mutex::new(JobSlot {
                current: id,
                group: None,
                created: vec![id],
            })),
        }
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, JobSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn current(&self) -> JobId {
        self.lock().current
    }

    pub(crate) fn created(&self) -> Vec<JobId> {
        self.lock().created.clone()
    }
}

/// Everything an operation needs while it runs.
///
/// Frames are cheap to clone; each pipeline stage gets its own clone with
/// its own ports. Variables are reached through shared cells, so a clone
/// sees the same variables as its parent.
#[derive(Clone)]
pub struct Frame {
    pub(crate) evaler: Arc<EvalerInner>,
    pub(crate) source: Source,
    pub(crate) locals: Arc<[Cell]>,
    pub(crate) captures: Arc<[Cell]>,
    pub ports: Ports,
    pub(crate) cancel: CancellationToken,
    pub(crate) job: Option<PipelineJob>,
}

impl Frame {
    pub(crate) fn top(evaler: Arc<EvalerInner>, source: Source, ports: Ports, cancel: CancellationToken) -> Self {
        Self {
            evaler,
            source,
            locals: Arc::from(Vec::new()),
            captures: Arc::from(Vec::new()),
            ports,
            cancel,
            job: None,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn job_controller(&self) -> &Arc<dyn JobController> {
        &self.evaler.jobs
    }

    /// A copy for a concurrently running stage.
    pub(crate) fn fork(&self, ports: Ports) -> Self {
        Self {
            ports,
            ..self.clone()
        }
    }

    pub fn check_cancel(&self) -> ExecResult<()> {
        if self.cancel.is_cancelled() {
            return Err(Exception::new(Cause::Canceled));
        }
        Ok(())
    }

    /// Send a value to the output port.
    pub async fn put(&self, value: Value) -> ExecResult<()> {
        self.ports.output.put(value, &self.cancel).await
    }

    /// Write bytes to the output port.
    pub async fn write(&self, data: &[u8]) -> ExecResult<()> {
        self.ports.output.write(data, &self.cancel).await
    }

    /// Write bytes to the error port.
    pub async fn write_err(&self, data: &[u8]) -> ExecResult<()> {
        self.ports.error.write(data, &self.cancel).await
    }

    pub async fn inputs(&self) -> Inputs {
        Inputs::open(&self.ports.input, &self.cancel).await
    }

    /// The cell behind a compiled variable reference.
    pub(crate) fn cell(&self, var: &VarRef) -> ExecResult<Cell> {
        let missing = || Exception::new(Cause::NoSuchVariable(describe(var)));
        match var {
            VarRef::Local(i) => self.locals.get(*i).cloned().ok_or_else(missing),
            VarRef::Capture(i) => self.captures.get(*i).cloned().ok_or_else(missing),
            VarRef::Global(i) => self.evaler.global(*i).ok_or_else(missing),
            VarRef::Builtin(i) => self.evaler.builtins.slot(*i).cloned().ok_or_else(missing),
            VarRef::Member(base, name) => match self.cell(base)?.get() {
                Value::Ns(ns) => ns.lookup(name).ok_or_else(missing),
                other => Err(Exception::new(Cause::wrong_type("ns", other.kind()))),
            },
            VarRef::Env(_) => Err(missing()),
        }
    }

    pub(crate) fn get_var(&self, var: &VarRef) -> ExecResult<Value> {
        match var {
            VarRef::Env(name) => Ok(Value::Str(std::env::var(name).unwrap_or_default())),
            _ => Ok(self.cell(var)?.get()),
        }
    }

    pub(crate) fn set_var(&self, var: &VarRef, value: Value) -> ExecResult<()> {
        match var {
            VarRef::Env(name) => {
                std::env::set_var(name, value.to_str());
                Ok(())
            }
            VarRef::Builtin(_) => Err(Exception::fail(format!("cannot assign to builtin variable {}", describe(var)))),
            _ => {
                self.cell(var)?.set(value);
                Ok(())
            }
        }
    }
}

fn describe(var: &VarRef) -> String {
    match var {
        VarRef::Local(i) => format!("local#{i}"),
        VarRef::Capture(i) => format!("capture#{i}"),
        VarRef::Global(i) => format!("global#{i}"),
        VarRef::Builtin(i) => format!("builtin#{i}"),
        VarRef::Env(name) => format!("E:{name}"),
        VarRef::Member(base, name) => format!("{}:{name}", describe(base)),
    }
}

/// A compiled operation bound to a frame, ready to run.
///
/// Dropping it without running does nothing. Running it races the work
/// against the frame's cancellation token.
pub struct Prepared<T = ()> {
    fut: BoxFuture<'static, ExecResult<T>>,
    cancel: CancellationToken,
}

impl<T> Prepared<T> {
    pub(crate) fn new(fut: BoxFuture<'static, ExecResult<T>>, cancel: CancellationToken) -> Self {
        Self { fut, cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn run(self) -> ExecResult<T> {
        let Prepared { fut, cancel } = self;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Exception::new(Cause::Canceled)),
            r = fut => r,
        }
    }
}
