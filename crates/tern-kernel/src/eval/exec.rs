//! Running the operation tree.
//!
//! Every operation runs against a [`Frame`]. Operations that can recurse
//! return boxed futures so the async call graph stays finitely sized.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};
use tern_glob::{expand, Pattern, RealFs};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::call::{call_block, call_value, make_closure};
use super::exception::{Cause, ExecResult, Exception, Flow, PipelineError};
use super::frame::{Frame, PipelineJob, Prepared};
use super::pipe::pipe;
use super::port::{ByteIn, ByteOut, InPort, OutPort, ValueIn, ValueOut};
use super::value::Value;
use crate::builtins::CallArgs;
use crate::compile::{
    ChunkOp, FormKind, FormOp, GlobPiece, HeadOp, LValue, PipelineOp, RedirOp, ValuesKind, ValuesOp, VarRef,
};
use crate::parse::RedirMode;
use crate::paths;

impl ChunkOp {
    /// Bind this chunk to a frame.
    pub fn prepare(self: &Arc<Self>, frame: Frame) -> Prepared {
        let op = self.clone();
        let cancel = frame.cancel.clone();
        Prepared::new(async move { exec_chunk(&op, &frame).await }.boxed(), cancel)
    }
}

impl PipelineOp {
    pub fn prepare(self: &Arc<Self>, frame: Frame) -> Prepared {
        let op = self.clone();
        let cancel = frame.cancel.clone();
        Prepared::new(async move { exec_pipeline(&op, &frame).await }.boxed(), cancel)
    }
}

impl FormOp {
    pub fn prepare(self: &Arc<Self>, frame: Frame) -> Prepared {
        let op = self.clone();
        let cancel = frame.cancel.clone();
        Prepared::new(async move { exec_form(&op, &frame).await }.boxed(), cancel)
    }
}

pub(crate) fn exec_chunk<'a>(op: &'a ChunkOp, frame: &'a Frame) -> BoxFuture<'a, ExecResult<()>> {
    async move {
        for pipeline in &op.pipelines {
            frame.check_cancel()?;
            exec_pipeline(pipeline, frame).await?;
        }
        Ok(())
    }
    .boxed()
}

// ============================================================================
// Pipelines
// ============================================================================

pub(crate) async fn exec_pipeline(op: &Arc<PipelineOp>, frame: &Frame) -> ExecResult<()> {
    if op.background {
        return spawn_background(op, frame);
    }
    let (frame, owned) = begin_job(frame)?;
    let result = run_stages(op, &frame).await;
    end_job(&frame, owned);
    result
}

/// Give the pipeline an OS job when job control is on and it is not already
/// running inside one. Returns whether the job is ours to release.
fn begin_job(frame: &Frame) -> ExecResult<(Frame, bool)> {
    if !frame.evaler.config.job_control || frame.job.is_some() {
        return Ok((frame.clone(), false));
    }
    let id = frame.evaler.jobs.create_job()?;
    let mut frame = frame.clone();
    frame.job = Some(PipelineJob::new(id));
    Ok((frame, true))
}

fn end_job(frame: &Frame, owned: bool) {
    let Some(job) = frame.job.as_ref().filter(|_| owned) else {
        return;
    };
    for id in job.created() {
        if let Err(e) = frame.evaler.jobs.release_job(id) {
            debug!(job = %id, "release failed: {e}");
        }
    }
}

fn spawn_background(op: &Arc<PipelineOp>, frame: &Frame) -> ExecResult<()> {
    // detached from the foreground: no input, its own job and cancellation
    let mut detached = frame.clone();
    detached.ports.input = InPort::default();
    detached.job = None;
    detached.cancel = CancellationToken::new();
    let (frame, owned) = begin_job(&detached)?;
    let os_job = frame.job.as_ref().map(PipelineJob::current);
    let text = frame.source.slice(op.span).trim().trim_end_matches('&').trim_end().to_string();
    let op = op.clone();
    let evaler = frame.evaler.clone();
    let cancel = frame.cancel.clone();
    let fut = async move {
        let result = run_stages(&op, &frame).await;
        end_job(&frame, owned);
        result
    };
    let id = evaler.background.spawn(text, os_job, cancel, fut);
    debug!(job = %id, "background pipeline started");
    Ok(())
}

/// Run every stage concurrently and wait for all of them.
#[instrument(level = "debug", skip_all, fields(stages = op.forms.len()))]
async fn run_stages(op: &PipelineOp, frame: &Frame) -> ExecResult<()> {
    match op.forms.as_slice() {
        [] => return Ok(()),
        [only] => return exec_form(only, frame).await,
        _ => {}
    }

    let config = &frame.evaler.config;
    let last = op.forms.len() - 1;
    let mut next_input = frame.ports.input.clone();
    let mut handles = Vec::with_capacity(op.forms.len());
    for (i, form) in op.forms.iter().enumerate() {
        let mut ports = frame.ports.clone();
        ports.input = std::mem::take(&mut next_input);
        if i < last {
            let (tx, rx) = mpsc::channel(config.value_capacity);
            let (w, r) = pipe(config.pipe_capacity);
            ports.output = OutPort {
                values: ValueOut::Chan(tx),
                bytes: ByteOut::Pipe(Arc::new(w)),
            };
            next_input = InPort {
                values: ValueIn::Chan(Arc::new(Mutex::new(rx))),
                bytes: ByteIn::Pipe(Arc::new(Mutex::new(r))),
            };
        }
        let stage = frame.fork(ports);
        let form = form.clone();
        handles.push(tokio::spawn(async move { exec_form(&form, &stage).await }));
    }

    let results = join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(e) => Some(Exception::fail(format!("pipeline stage panicked: {e}"))),
        })
        .collect();
    PipelineError::collapse(results)
}

// ============================================================================
// Forms
// ============================================================================

pub(crate) fn exec_form<'a>(op: &'a FormOp, frame: &'a Frame) -> BoxFuture<'a, ExecResult<()>> {
    async move {
        let redirected;
        let frame = if op.redirs.is_empty() {
            frame
        } else {
            redirected = redirect(&op.redirs, frame).await?;
            &redirected
        };
        form_kind(op, frame)
            .await
            .map_err(|e| if e.flow().is_some() { e } else { e.with_frame(&frame.source, op.span) })
    }
    .boxed()
}

async fn form_kind(op: &FormOp, frame: &Frame) -> ExecResult<()> {
    match &op.kind {
        FormKind::Call { head, args, opts } => {
            let callee = match head {
                HeadOp::Var(var) => {
                    let f = frame.get_var(var)?;
                    if !f.is_callable() {
                        return Err(Exception::new(Cause::wrong_type("callable", f.kind())));
                    }
                    f
                }
                HeadOp::External(name) => Value::Str(name.clone()),
                HeadOp::Values(values) => match eval_one(values, frame, "command head").await? {
                    f @ (Value::Builtin(_) | Value::Closure(_) | Value::Str(_)) => f,
                    other => return Err(Exception::new(Cause::wrong_type("callable or command name", other.kind()))),
                },
            };
            let mut call = CallArgs::new(eval_all(args, frame).await?);
            for opt in opts {
                let v = eval_one(&opt.value, frame, &format!("option {}", opt.name)).await?;
                call.opts.insert(opt.name.clone(), v);
            }
            call_value(&callee, call, frame).await
        }

        FormKind::Var { targets, values } => match values {
            None => {
                for t in targets {
                    let empty = if t.rest { Value::list(Vec::new()) } else { Value::Nil };
                    frame.set_var(&t.var, empty)?;
                }
                Ok(())
            }
            Some(values) => {
                let values = eval_all(values, frame).await?;
                assign(targets, values, frame).await
            }
        },

        FormKind::Set { targets, values } => {
            let values = eval_all(values, frame).await?;
            assign(targets, values, frame).await
        }

        FormKind::Del { targets } => {
            for t in targets {
                if t.indices.is_empty() {
                    match &t.var {
                        VarRef::Env(name) => std::env::remove_var(name),
                        var => frame.set_var(var, Value::Nil)?,
                    }
                    continue;
                }
                let path = eval_indices(&t.indices, frame).await?;
                let old = frame.get_var(&t.var)?;
                frame.set_var(&t.var, dissoc_path(&old, &path)?)?;
            }
            Ok(())
        }

        FormKind::Fn { target, lambda } => {
            let closure = make_closure(lambda, frame, true).await?;
            frame.set_var(target, Value::Closure(closure))
        }

        FormKind::If { branches, otherwise } => {
            for (cond, body) in branches {
                if all_truthy(cond, frame).await? {
                    return call_block(body, frame).await;
                }
            }
            match otherwise {
                Some(body) => call_block(body, frame).await,
                None => Ok(()),
            }
        }

        FormKind::While { cond, body, otherwise } => {
            let mut ran = false;
            while all_truthy(cond, frame).await? {
                frame.check_cancel()?;
                ran = true;
                match call_block(body, frame).await {
                    Ok(()) => {}
                    Err(e) => match e.flow() {
                        Some(Flow::Break) => break,
                        Some(Flow::Continue) => continue,
                        _ => return Err(e),
                    },
                }
            }
            match otherwise {
                Some(body) if !ran => call_block(body, frame).await,
                _ => Ok(()),
            }
        }

        FormKind::For { var, iterable, body, otherwise } => {
            let items = eval_one(iterable, frame, "iterable").await?.iterate()?;
            let ran = !items.is_empty();
            for item in items {
                frame.check_cancel()?;
                set_lvalue(var, item, frame).await?;
                match call_block(body, frame).await {
                    Ok(()) => {}
                    Err(e) => match e.flow() {
                        Some(Flow::Break) => break,
                        Some(Flow::Continue) => continue,
                        _ => return Err(e),
                    },
                }
            }
            match otherwise {
                Some(body) if !ran => call_block(body, frame).await,
                _ => Ok(()),
            }
        }

        FormKind::Try {
            body,
            catch,
            otherwise,
            finally,
        } => {
            let mut result = call_block(body, frame).await;
            match &result {
                Err(e) if e.flow().is_none() && !e.is_canceled() => {
                    if let Some((var, handler)) = catch {
                        if let Some(var) = var {
                            let caught = Value::Exception(Some(Arc::new(e.clone())));
                            set_lvalue(var, caught, frame).await?;
                        }
                        result = call_block(handler, frame).await;
                    }
                }
                Ok(()) => {
                    if let Some(body) = otherwise {
                        result = call_block(body, frame).await;
                    }
                }
                Err(_) => {}
            }
            if let Some(body) = finally {
                call_block(body, frame).await?;
            }
            result
        }

        FormKind::And(args) => {
            let mut last = Value::Bool(true);
            for arg in args {
                for v in eval_values(arg, frame).await? {
                    if !v.truthy() {
                        return frame.put(v).await;
                    }
                    last = v;
                }
            }
            frame.put(last).await
        }

        FormKind::Or(args) => {
            let mut last = Value::Bool(false);
            for arg in args {
                for v in eval_values(arg, frame).await? {
                    if v.truthy() {
                        return frame.put(v).await;
                    }
                    last = v;
                }
            }
            frame.put(last).await
        }

        FormKind::Use { target, module } => {
            let ns = frame
                .evaler
                .module(module)
                .ok_or_else(|| Exception::fail(format!("no such module: {module}")))?;
            frame.set_var(target, Value::Ns(ns))
        }

        FormKind::Nop => Ok(()),
    }
}

/// Redirect the byte side of the frame's ports to files.
async fn redirect(redirs: &[RedirOp], frame: &Frame) -> ExecResult<Frame> {
    let mut ports = frame.ports.clone();
    for r in redirs {
        let path = eval_one(&r.target, frame, "redirection target").await?.to_str();
        let mut options = tokio::fs::OpenOptions::new();
        match r.mode {
            RedirMode::Read => options.read(true),
            RedirMode::Write => options.write(true).create(true).truncate(true),
            RedirMode::Append => options.append(true).create(true),
            RedirMode::ReadWrite => options.read(true).write(true).create(true),
        };
        let file = options
            .open(&path)
            .await
            .map_err(|e| Exception::new(Cause::Io(format!("{path}: {e}"))))?;
        let file = Arc::new(Mutex::new(file));
        match r.fd {
            0 => ports.input.bytes = ByteIn::File(file),
            1 => ports.output.bytes = ByteOut::File(file),
            2 => ports.error.bytes = ByteOut::File(file),
            fd => return Err(Exception::new(Cause::bad_value("fd", "0, 1 or 2", fd.to_string()))),
        }
    }
    Ok(frame.fork(ports))
}

// ============================================================================
// Assignment
// ============================================================================

async fn assign(targets: &[LValue], mut values: Vec<Value>, frame: &Frame) -> ExecResult<()> {
    let rest = targets.iter().position(|t| t.rest);
    let n = values.len();
    match rest {
        None if n != targets.len() => {
            return Err(Exception::new(Cause::arity(
                "assignment right-hand-side",
                targets.len().to_string(),
                n,
            )))
        }
        Some(_) if n + 1 < targets.len() => {
            return Err(Exception::new(Cause::arity(
                "assignment right-hand-side",
                format!("{} or more", targets.len() - 1),
                n,
            )))
        }
        _ => {}
    }
    if let Some(r) = rest {
        let after = targets.len() - r - 1;
        let tail = values.split_off(n - after);
        let middle = values.split_off(r);
        values.push(Value::list(middle));
        values.extend(tail);
    }
    for (t, v) in targets.iter().zip(values) {
        set_lvalue(t, v, frame).await?;
    }
    Ok(())
}

async fn set_lvalue(t: &LValue, v: Value, frame: &Frame) -> ExecResult<()> {
    if t.indices.is_empty() {
        return frame.set_var(&t.var, v);
    }
    let path = eval_indices(&t.indices, frame).await?;
    let old = frame.get_var(&t.var)?;
    frame.set_var(&t.var, assoc_path(&old, &path, v)?)
}

async fn eval_indices(indices: &[ValuesOp], frame: &Frame) -> ExecResult<Vec<Value>> {
    let mut out = Vec::with_capacity(indices.len());
    for idx in indices {
        out.push(eval_one(idx, frame, "index").await?);
    }
    Ok(out)
}

fn assoc_path(container: &Value, path: &[Value], v: Value) -> Result<Value, Cause> {
    match path {
        [] => Ok(v),
        [idx, rest @ ..] => {
            let inner = if rest.is_empty() {
                v
            } else {
                assoc_path(&container.index(idx)?, rest, v)?
            };
            container.assoc(idx, inner)
        }
    }
}

fn dissoc_path(container: &Value, path: &[Value]) -> Result<Value, Cause> {
    match path {
        [] => Ok(container.clone()),
        [idx] => container.dissoc(idx),
        [idx, rest @ ..] => container.assoc(idx, dissoc_path(&container.index(idx)?, rest)?),
    }
}

// ============================================================================
// Values
// ============================================================================

/// Values of a sequence of arguments, flattened.
pub(crate) async fn eval_all(ops: &[ValuesOp], frame: &Frame) -> ExecResult<Vec<Value>> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        out.extend(eval_values(op, frame).await?);
    }
    Ok(out)
}

/// Exactly one value, or an arity error naming `what`.
pub(crate) async fn eval_one(op: &ValuesOp, frame: &Frame, what: &str) -> ExecResult<Value> {
    let mut values = eval_values(op, frame).await?;
    if values.len() != 1 {
        return Err(Exception::new(Cause::arity(what, "1", values.len())).with_frame(&frame.source, op.span));
    }
    Ok(values.remove(0))
}

async fn all_truthy(op: &ValuesOp, frame: &Frame) -> ExecResult<bool> {
    Ok(eval_values(op, frame).await?.iter().all(Value::truthy))
}

pub(crate) fn eval_values<'a>(op: &'a ValuesOp, frame: &'a Frame) -> BoxFuture<'a, ExecResult<Vec<Value>>> {
    async move {
        values_kind(op, frame)
            .await
            .map_err(|e| if e.stack.is_empty() { e.with_frame(&frame.source, op.span) } else { e })
    }
    .boxed()
}

async fn values_kind(op: &ValuesOp, frame: &Frame) -> ExecResult<Vec<Value>> {
    match &op.kind {
        ValuesKind::Literal(s) => Ok(vec![Value::str(s.as_str())]),
        ValuesKind::Bool(b) => Ok(vec![Value::Bool(*b)]),
        ValuesKind::Var { var, splice } => {
            let v = frame.get_var(var)?;
            if !*splice {
                return Ok(vec![v]);
            }
            match v {
                Value::List(items) => Ok(items.as_ref().clone()),
                other => Err(Exception::new(Cause::wrong_type("list", other.kind()))),
            }
        }
        ValuesKind::Compound(parts) => {
            let mut acc = vec![Value::str("")];
            for part in parts {
                let next = eval_values(part, frame).await?;
                let mut product = Vec::with_capacity(acc.len() * next.len());
                for a in &acc {
                    for b in &next {
                        product.push(a.concat(b)?);
                    }
                }
                acc = product;
            }
            Ok(acc)
        }
        ValuesKind::Index { base, indices } => {
            let mut current = eval_values(base, frame).await?;
            for bracket in indices {
                let idx = eval_all(bracket, frame).await?;
                let mut next = Vec::with_capacity(current.len() * idx.len());
                for v in &current {
                    for i in &idx {
                        next.push(v.index(i)?);
                    }
                }
                current = next;
            }
            Ok(current)
        }
        ValuesKind::Tilde => {
            let home = paths::home_dir().ok_or_else(|| Exception::fail("cannot determine home directory"))?;
            Ok(vec![Value::str(home.to_string_lossy())])
        }
        ValuesKind::Glob(pieces) => glob(pieces, frame).await,
        ValuesKind::Capture(chunk) => capture_output(chunk, frame).await,
        ValuesKind::ExceptionCapture(chunk) => match exec_chunk(chunk, frame).await {
            Ok(()) => Ok(vec![Value::Exception(None)]),
            Err(e) if e.flow().is_some() || e.is_canceled() => Err(e),
            Err(e) => Ok(vec![Value::Exception(Some(Arc::new(e)))]),
        },
        ValuesKind::List(elems) => Ok(vec![Value::list(eval_all(elems, frame).await?)]),
        ValuesKind::Map(pairs) => {
            let mut entries = std::collections::BTreeMap::new();
            for (k, v) in pairs {
                let k = eval_one(k, frame, "map key").await?;
                let v = eval_one(v, frame, "map value").await?;
                entries.insert(k.to_str(), v);
            }
            Ok(vec![Value::map(entries)])
        }
        ValuesKind::Lambda(lambda) => Ok(vec![Value::Closure(make_closure(lambda, frame, false).await?)]),
    }
}

async fn glob(pieces: &[GlobPiece], frame: &Frame) -> ExecResult<Vec<Value>> {
    let mut patterns = vec![String::new()];
    for piece in pieces {
        match piece {
            GlobPiece::Wild(w) => patterns.iter_mut().for_each(|p| p.push_str(w)),
            GlobPiece::Values(op) => {
                let values = eval_values(op, frame).await?;
                let mut next = Vec::with_capacity(patterns.len() * values.len());
                for p in &patterns {
                    for v in &values {
                        let (Value::Str(_) | Value::Num(_)) = v else {
                            return Err(Exception::new(Cause::wrong_type("string", v.kind())));
                        };
                        next.push(format!("{p}{}", tern_glob::escape(&v.to_str())));
                    }
                }
                patterns = next;
            }
        }
    }

    let mut out = Vec::new();
    for text in patterns {
        let pattern = Pattern::parse(&text);
        let matches = expand(&pattern, &RealFs)
            .await
            .map_err(|e| Exception::new(Cause::io(e)))?;
        if matches.is_empty() {
            return Err(Exception::fail(format!("wildcard has no match: {text}")));
        }
        out.extend(matches.into_iter().map(Value::Str));
    }
    Ok(out)
}

/// Run a chunk with its output captured: values as sent, then bytes split
/// into lines.
pub(crate) async fn capture_output(chunk: &ChunkOp, frame: &Frame) -> ExecResult<Vec<Value>> {
    let config = &frame.evaler.config;
    let (tx, mut rx) = mpsc::channel(config.value_capacity);
    let (w, mut r) = pipe(config.pipe_capacity);
    let mut ports = frame.ports.clone();
    ports.output = OutPort {
        values: ValueOut::Chan(tx),
        bytes: ByteOut::Pipe(Arc::new(w)),
    };
    let sub = frame.fork(ports);

    let run = async move { exec_chunk(chunk, &sub).await };
    let values = async {
        let mut values = Vec::new();
        while let Some(v) = rx.recv().await {
            values.push(v);
        }
        values
    };
    let bytes = async {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.map(|_| buf)
    };
    let (result, mut values, bytes) = tokio::join!(run, values, bytes);
    result?;
    let bytes = bytes.map_err(|e| Exception::new(Cause::io(e)))?;
    values.extend(String::from_utf8_lossy(&bytes).lines().map(Value::str));
    Ok(values)
}
