//! Calling closures and builtins.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::exception::{Cause, ExecResult, Exception, Flow};
use super::exec::{eval_one, exec_chunk};
use super::external::run_external;
use super::frame::Frame;
use super::ns::{new_cell, Cell};
use super::value::{Closure, Value};
use crate::builtins::CallArgs;
use crate::compile::{CaptureFrom, LambdaOp};

/// Build a closure from a lambda in the context of `frame`.
///
/// Captured cells are taken from the frame, so the closure shares them with
/// the scope that declared them. Option defaults are evaluated now.
pub(crate) async fn make_closure(op: &Arc<LambdaOp>, frame: &Frame, catch_return: bool) -> ExecResult<Arc<Closure>> {
    let mut captured: Vec<Cell> = Vec::with_capacity(op.captures.len());
    for from in &op.captures {
        let cell = match from {
            CaptureFrom::Local(i) => frame.locals.get(*i),
            CaptureFrom::Capture(i) => frame.captures.get(*i),
        };
        let cell = cell
            .cloned()
            .ok_or_else(|| Exception::fail("captured variable is not in scope"))?;
        captured.push(cell);
    }
    let mut opt_defaults = Vec::with_capacity(op.opts.len());
    for (name, default) in &op.opts {
        opt_defaults.push(eval_one(default, frame, &format!("default of option {name}")).await?);
    }
    Ok(Arc::new(Closure {
        op: op.clone(),
        captured: captured.into(),
        opt_defaults,
        source: frame.source.clone(),
        catch_return,
    }))
}

/// Call any callable value. A string names an external command.
pub fn call_value<'a>(f: &'a Value, args: CallArgs, frame: &'a Frame) -> BoxFuture<'a, ExecResult<()>> {
    async move {
        match f {
            Value::Builtin(b) => b.call(frame, args).await,
            Value::Closure(c) => call_closure(c, args, frame).await,
            Value::Str(name) => {
                if let Some(opt) = args.opts.keys().next() {
                    return Err(Exception::new(Cause::bad_value("option", "none for external commands", opt.clone())));
                }
                run_external(name, &args.args, frame).await
            }
            other => Err(Exception::new(Cause::wrong_type("callable", other.kind()))),
        }
    }
    .boxed()
}

pub(crate) async fn call_closure(c: &Closure, mut args: CallArgs, frame: &Frame) -> ExecResult<()> {
    let op = &c.op;
    let n = args.args.len();
    let want = op.params.len();
    match op.rest {
        None if n != want => return Err(Exception::new(Cause::arity("arguments", want.to_string(), n))),
        Some(_) if n + 1 < want => {
            return Err(Exception::new(Cause::arity("arguments", format!("{} or more", want - 1), n)))
        }
        _ => {}
    }

    let locals: Vec<Cell> = (0..op.locals).map(|_| new_cell(Value::Nil)).collect();
    let mut positional = std::mem::take(&mut args.args);
    match op.rest {
        None => {
            for (slot, v) in positional.into_iter().enumerate() {
                locals[slot].set(v);
            }
        }
        Some(r) => {
            let after = want - r - 1;
            let tail = positional.split_off(n - after);
            let rest = positional.split_off(r);
            for (slot, v) in positional.into_iter().enumerate() {
                locals[slot].set(v);
            }
            locals[r].set(Value::list(rest));
            for (i, v) in tail.into_iter().enumerate() {
                locals[r + 1 + i].set(v);
            }
        }
    }

    for (i, (name, _)) in op.opts.iter().enumerate() {
        let v = match args.opts.remove(name) {
            Some(v) => v,
            None => c.opt_defaults.get(i).cloned().unwrap_or_default(),
        };
        locals[op.opt_slot(i)].set(v);
    }
    if let Some(unknown) = args.opts.keys().next() {
        let known: Vec<&str> = op.opts.iter().map(|(n, _)| n.as_str()).collect();
        let want = if known.is_empty() {
            "none".to_string()
        } else {
            known.join(" or ")
        };
        return Err(Exception::new(Cause::bad_value("option", want, unknown.clone())));
    }

    let inner = Frame {
        locals: locals.into(),
        captures: c.captured.clone(),
        source: c.source.clone(),
        ..frame.clone()
    };
    match exec_chunk(&op.body, &inner).await {
        Err(e) if c.catch_return && e.flow() == Some(Flow::Return) => Ok(()),
        r => r,
    }
}

/// Run a block (a lambda with no parameters) in place.
pub(crate) async fn call_block(op: &Arc<LambdaOp>, frame: &Frame) -> ExecResult<()> {
    let closure = make_closure(op, frame, false).await?;
    call_closure(&closure, CallArgs::default(), frame).await
}
