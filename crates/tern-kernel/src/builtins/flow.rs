//! Control flow: return, break, continue, fail.

use async_trait::async_trait;

use super::{Builtin, CallArgs};
use crate::eval::{Cause, ExecResult, Exception, Flow, Frame, NsBuilder, Value};

pub(crate) fn register(b: NsBuilder) -> NsBuilder {
    b.add_fn(Jump(Flow::Return))
        .add_fn(Jump(Flow::Break))
        .add_fn(Jump(Flow::Continue))
        .add_fn(Fail)
}

/// Raises a flow exception, caught by the enclosing function or loop.
struct Jump(Flow);

#[async_trait]
impl Builtin for Jump {
    fn name(&self) -> &str {
        match self.0 {
            Flow::Return => "return",
            Flow::Break => "break",
            Flow::Continue => "continue",
        }
    }

    async fn call(&self, _frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(0))?;
        Err(Cause::Flow(self.0).into())
    }
}

/// `fail message`, or `fail $e` to rethrow a captured exception.
pub struct Fail;

#[async_trait]
impl Builtin for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    async fn call(&self, _frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(1))?;
        match &args.args[0] {
            Value::Exception(Some(e)) => Err(e.as_ref().clone()),
            other => Err(Exception::fail(other.to_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::eval::{Cause, Flow};
    use crate::{EvalError, Evaler, Value};

    #[tokio::test]
    async fn fail_message_and_rethrow() {
        let ev = Evaler::transient();
        let out = ev.eval_capture("t", "fail oops").await;
        match out.result {
            Err(EvalError::Exception(e)) => assert!(matches!(e.cause, Cause::Fail(ref m) if m == "oops")),
            other => panic!("unexpected {other:?}"),
        }
        let out = ev.eval_capture("t", "var e = ?(fail inner); fail $e").await;
        let e = out.result.unwrap_err();
        assert_eq!(e.to_string(), "inner");
    }

    #[tokio::test]
    async fn return_stops_a_function() {
        let out = Evaler::transient()
            .eval_capture("t", "fn f { put a; return; put b }; f; put c")
            .await;
        out.result.unwrap();
        assert_eq!(out.values, vec![Value::str("a"), Value::str("c")]);
    }

    #[tokio::test]
    async fn stray_break_is_an_error() {
        let out = Evaler::transient().eval_capture("t", "fn f { break }; f").await;
        let err = out.result.unwrap_err();
        assert!(matches!(err.exception().map(|e| &e.cause), Some(Cause::Flow(Flow::Break))));
    }
}
