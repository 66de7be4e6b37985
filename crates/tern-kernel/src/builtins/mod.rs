//! Builtin functions.
//!
//! Each builtin is a type implementing [`Builtin`]. They are collected into
//! the builtin namespace by [`ns`], which the compiler sees as the outermost
//! scope.

mod flow;
mod io;
mod job;
mod json;
mod num;
mod os;
mod value;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::eval::{Cause, ExecResult, Frame, Ns, NsBuilder, Value};

/// A function implemented in Rust.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Name without the trailing `~`.
    fn name(&self) -> &str;

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()>;
}

/// Evaluated arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub opts: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            opts: BTreeMap::new(),
        }
    }

    pub fn with_opt(mut self, name: impl Into<String>, value: Value) -> Self {
        self.opts.insert(name.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Fail unless there are between `min` and `max` arguments.
    pub fn arity(&self, min: usize, max: Option<usize>) -> Result<(), Cause> {
        let n = self.args.len();
        let ok = n >= min && max.map_or(true, |m| n <= m);
        if ok {
            return Ok(());
        }
        let want = match max {
            Some(m) if m == min => min.to_string(),
            Some(m) => format!("{min} to {m}"),
            None => format!("{min} or more"),
        };
        Err(Cause::arity("arguments", want, n))
    }

    /// Fail if any option outside `known` was passed.
    pub fn only_opts(&self, known: &[&str]) -> Result<(), Cause> {
        match self.opts.keys().find(|k| !known.contains(&k.as_str())) {
            Some(k) => Err(Cause::bad_value("option", known.join(" or "), k.clone())),
            None => Ok(()),
        }
    }

    pub fn opt(&self, name: &str) -> Option<&Value> {
        self.opts.get(name)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.opts.get(name).is_some_and(Value::truthy)
    }
}

/// Arguments if given, otherwise everything on the input port.
pub(crate) async fn args_or_inputs(frame: &Frame, args: Vec<Value>) -> ExecResult<Vec<Value>> {
    if !args.is_empty() {
        return Ok(args);
    }
    frame.inputs().await.collect().await
}

/// The builtin namespace.
pub fn ns() -> Ns {
    let b = NsBuilder::new("builtin")
        .add_var("nil", Value::Nil)
        .add_var("true", Value::Bool(true))
        .add_var("false", Value::Bool(false))
        .add_var("ok", Value::Exception(None))
        .add_var("pid", Value::str(std::process::id().to_string()));
    let b = io::register(b);
    let b = value::register(b);
    let b = num::register(b);
    let b = flow::register(b);
    let b = json::register(b);
    let b = os::register(b);
    let b = job::register(b);
    b.build()
}
