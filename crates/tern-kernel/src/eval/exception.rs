//! Runtime exceptions and their per-stage aggregation.

use std::fmt;
use std::sync::Arc;

use tern_types::{JobError, Source, Span};
use thiserror::Error;

use crate::num::NumError;

/// Non-local control flow, carried as an exception until caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Return,
    Break,
    Continue,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Return => write!(f, "return"),
            Flow::Break => write!(f, "break"),
            Flow::Continue => write!(f, "continue"),
        }
    }
}

/// What went wrong.
#[derive(Debug, Clone, Error)]
pub enum Cause {
    /// Raised by `fail`, or a plain error message from a builtin.
    #[error("{0}")]
    Fail(String),

    #[error("{cmd} exited with {code}")]
    ExternalExit { cmd: String, pid: u32, code: i32 },

    #[error("{cmd} killed by signal {signal}")]
    ExternalSignaled { cmd: String, pid: u32, signal: i32 },

    #[error("{0}")]
    Pipeline(PipelineError),

    #[error("arity mismatch: {what} must be {want}, but is {got}")]
    Arity { what: String, want: String, got: usize },

    #[error("wrong type: need {want}, got {got}")]
    WrongType { want: String, got: String },

    #[error("bad value: {what} must be {want}, but is {got}")]
    BadValue { what: String, want: String, got: String },

    #[error(transparent)]
    Num(#[from] NumError),

    #[error("variable ${0} not found")]
    NoSuchVariable(String),

    #[error("{0}")]
    Io(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("canceled")]
    Canceled,

    #[error("{0} used outside of its construct")]
    Flow(Flow),
}

impl Cause {
    pub fn arity(what: impl Into<String>, want: impl Into<String>, got: usize) -> Self {
        Cause::Arity {
            what: what.into(),
            want: want.into(),
            got,
        }
    }

    pub fn wrong_type(want: impl Into<String>, got: impl Into<String>) -> Self {
        Cause::WrongType {
            want: want.into(),
            got: got.into(),
        }
    }

    pub fn bad_value(what: impl Into<String>, want: impl Into<String>, got: impl Into<String>) -> Self {
        Cause::BadValue {
            what: what.into(),
            want: want.into(),
            got: got.into(),
        }
    }

    pub fn io(err: impl fmt::Display) -> Self {
        Cause::Io(err.to_string())
    }
}

/// One frame of exception context: which source and range was running.
#[derive(Debug, Clone)]
pub struct StackEntry {
    pub source: Source,
    pub span: Span,
}

/// A runtime error with the call context it passed through.
#[derive(Debug, Clone)]
pub struct Exception {
    pub cause: Cause,
    /// Innermost first.
    pub stack: Vec<StackEntry>,
}

impl Exception {
    pub fn new(cause: Cause) -> Self {
        Self {
            cause,
            stack: Vec::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(Cause::Fail(message.into()))
    }

    /// Record that the exception passed through `span` of `source`.
    pub fn with_frame(mut self, source: &Source, span: Span) -> Self {
        self.stack.push(StackEntry {
            source: source.clone(),
            span,
        });
        self
    }

    pub fn flow(&self) -> Option<Flow> {
        match self.cause {
            Cause::Flow(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.cause, Cause::Canceled)
    }

    /// Message plus one `name:line:col` line per stack entry.
    pub fn render(&self) -> String {
        let mut out = format!("Exception: {}", self.cause);
        for entry in &self.stack {
            let (line, col) = entry.span.to_line_col(entry.source.code());
            out.push_str(&format!(
                "\n  {}:{}:{}: {}",
                entry.source.name(),
                line,
                col,
                entry.source.slice(entry.span).lines().next().unwrap_or_default()
            ));
        }
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cause.fmt(f)
    }
}

impl std::error::Error for Exception {}

impl From<Cause> for Exception {
    fn from(cause: Cause) -> Self {
        Exception::new(cause)
    }
}

impl From<NumError> for Exception {
    fn from(err: NumError) -> Self {
        Exception::new(Cause::Num(err))
    }
}

impl From<JobError> for Exception {
    fn from(err: JobError) -> Self {
        Exception::new(Cause::Job(err))
    }
}

pub type ExecResult<T = ()> = Result<T, Exception>;

/// Outcome of every stage of one pipeline, in stage order.
///
/// `None` entries are stages that succeeded.
#[derive(Debug, Clone)]
pub struct PipelineError(pub Vec<Option<Arc<Exception>>>);

impl PipelineError {
    /// `Ok` iff every stage succeeded. A single stage reports its own
    /// exception; several stages report the aggregate.
    pub fn collapse(results: Vec<Option<Exception>>) -> ExecResult<()> {
        if results.iter().all(Option::is_none) {
            return Ok(());
        }
        if results.len() == 1 {
            if let Some(Some(e)) = results.into_iter().next() {
                return Err(e);
            }
            return Ok(());
        }
        let entries = results.into_iter().map(|r| r.map(Arc::new)).collect();
        Err(Exception::new(Cause::Pipeline(PipelineError(entries))))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &Exception)> {
        self.0.iter().enumerate().filter_map(|(i, e)| e.as_deref().map(|e| (i, e)))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multiple errors in pipeline: [")?;
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match entry {
                Some(e) => write!(f, "{e}")?,
                None => write!(f, "ok")?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_all_ok() {
        assert!(PipelineError::collapse(vec![None, None, None]).is_ok());
    }

    #[test]
    fn collapse_single_stage_is_unwrapped() {
        let err = PipelineError::collapse(vec![Some(Exception::fail("boom"))]).unwrap_err();
        assert!(matches!(err.cause, Cause::Fail(ref m) if m == "boom"));
    }

    #[test]
    fn collapse_keeps_every_entry_in_order() {
        let err = PipelineError::collapse(vec![None, Some(Exception::fail("x")), None]).unwrap_err();
        let Cause::Pipeline(p) = err.cause else {
            panic!("expected pipeline error, got {err}");
        };
        assert_eq!(p.len(), 3);
        assert_eq!(p.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);
        assert_eq!(p.to_string(), "multiple errors in pipeline: [ok, x, ok]");
    }

    #[test]
    fn render_includes_location() {
        let src = Source::new("a.tn", "put 1\nfail oops");
        let e = Exception::fail("oops").with_frame(&src, Span::new(6, 15));
        assert_eq!(e.render(), "Exception: oops\n  a.tn:2:1: fail oops");
    }
}
