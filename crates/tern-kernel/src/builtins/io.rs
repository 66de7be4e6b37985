//! Value and byte I/O: put, echo, print, slurp, from-lines, to-lines, all,
//! one, each, count, nop.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{args_or_inputs, Builtin, CallArgs};
use crate::eval::{call_value, Cause, ExecResult, Exception, Flow, Frame, NsBuilder, Value};

pub(crate) fn register(b: NsBuilder) -> NsBuilder {
    b.add_fn(Put)
        .add_fn(Echo)
        .add_fn(Print)
        .add_fn(Slurp)
        .add_fn(FromLines)
        .add_fn(ToLines)
        .add_fn(All)
        .add_fn(One)
        .add_fn(Each)
        .add_fn(Count)
        .add_fn(Nop)
}

/// Writes each argument as a value.
pub struct Put;

#[async_trait]
impl Builtin for Put {
    fn name(&self) -> &str {
        "put"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        for v in args.args {
            frame.put(v).await?;
        }
        Ok(())
    }
}

fn joined(args: &CallArgs) -> ExecResult<String> {
    args.only_opts(&["sep"])?;
    let sep = args.opt("sep").map_or_else(|| " ".to_string(), Value::to_str);
    Ok(args.args.iter().map(Value::to_str).collect::<Vec<_>>().join(&sep))
}

/// Writes the arguments as bytes, separated by `&sep` (a space), plus a newline.
pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        let mut text = joined(&args)?;
        text.push('\n');
        frame.write(text.as_bytes()).await
    }
}

/// Like `echo` without the newline.
pub struct Print;

#[async_trait]
impl Builtin for Print {
    fn name(&self) -> &str {
        "print"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        let text = joined(&args)?;
        frame.write(text.as_bytes()).await
    }
}

/// Reads the whole byte input into one string.
pub struct Slurp;

#[async_trait]
impl Builtin for Slurp {
    fn name(&self) -> &str {
        "slurp"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(0))?;
        let bytes = frame.ports.input.bytes.read_all(frame.cancel_token()).await?;
        frame.put(Value::Str(String::from_utf8_lossy(&bytes).into_owned())).await
    }
}

/// Each line of the byte input as a string value.
pub struct FromLines;

#[async_trait]
impl Builtin for FromLines {
    fn name(&self) -> &str {
        "from-lines"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(0))?;
        let Some(reader) = frame.ports.input.bytes.reader().await else {
            return Ok(());
        };
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = tokio::select! {
                biased;
                _ = frame.cancel_token().cancelled() => return Err(Cause::Canceled.into()),
                line = lines.next_line() => line.map_err(Cause::io)?,
            };
            match line {
                Some(line) => frame.put(Value::Str(line)).await?,
                None => return Ok(()),
            }
        }
    }
}

/// Writes each value (arguments, or else inputs) as a line of bytes.
pub struct ToLines;

#[async_trait]
impl Builtin for ToLines {
    fn name(&self) -> &str {
        "to-lines"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        for v in args_or_inputs(frame, args.args).await? {
            let mut line = v.to_str();
            line.push('\n');
            frame.write(line.as_bytes()).await?;
        }
        Ok(())
    }
}

/// Passes inputs through, or puts the elements of a list argument.
pub struct All;

#[async_trait]
impl Builtin for All {
    fn name(&self) -> &str {
        "all"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(1))?;
        if let Some(list) = args.args.first() {
            for v in list.iterate()? {
                frame.put(v).await?;
            }
            return Ok(());
        }
        let mut inputs = frame.inputs().await;
        while let Some(v) = inputs.next().await? {
            frame.put(v).await?;
        }
        Ok(())
    }
}

/// Passes through exactly one input, or the single element of a list.
pub struct One;

#[async_trait]
impl Builtin for One {
    fn name(&self) -> &str {
        "one"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(1))?;
        let mut values = match args.args.first() {
            Some(list) => list.iterate()?,
            None => frame.inputs().await.collect().await?,
        };
        if values.len() != 1 {
            return Err(Cause::arity("values", "1", values.len()).into());
        }
        frame.put(values.remove(0)).await
    }
}

/// Calls a function on each input. `break` stops, `continue` skips.
pub struct Each;

#[async_trait]
impl Builtin for Each {
    fn name(&self) -> &str {
        "each"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(2))?;
        args.only_opts(&[])?;
        let f = &args.args[0];
        if !f.is_callable() {
            return Err(Cause::wrong_type("fn", f.kind()).into());
        }
        let values = match args.args.get(1) {
            Some(list) => list.iterate()?,
            None => frame.inputs().await.collect().await?,
        };
        for v in values {
            frame.check_cancel()?;
            match call_value(f, CallArgs::new(vec![v]), frame).await {
                Ok(()) => {}
                Err(e) if e.flow() == Some(Flow::Break) => break,
                Err(e) if e.flow() == Some(Flow::Continue) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Number of inputs, or of elements of the argument.
pub struct Count;

#[async_trait]
impl Builtin for Count {
    fn name(&self) -> &str {
        "count"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(1))?;
        let n = match args.args.first() {
            Some(Value::Str(s)) => s.chars().count(),
            Some(Value::Map(m)) => m.len(),
            Some(other) => other.iterate()?.len(),
            None => {
                let mut inputs = frame.inputs().await;
                let mut n = 0;
                while inputs.next().await?.is_some() {
                    n += 1;
                }
                n
            }
        };
        let n = i64::try_from(n).map_err(|_| Exception::fail("count overflows"))?;
        frame.put(Value::from(n)).await
    }
}

/// Accepts any arguments and does nothing.
pub struct Nop;

#[async_trait]
impl Builtin for Nop {
    fn name(&self) -> &str {
        "nop"
    }

    async fn call(&self, _frame: &Frame, _args: CallArgs) -> ExecResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Evaler, Value};

    async fn values(code: &str) -> Vec<Value> {
        let out = Evaler::transient().eval_capture("test", code).await;
        out.result.unwrap();
        out.values
    }

    async fn text(code: &str) -> String {
        let out = Evaler::transient().eval_capture("test", code).await;
        out.result.as_ref().unwrap();
        out.text()
    }

    #[tokio::test]
    async fn echo_and_print() {
        assert_eq!(text("echo a b; print c d; print &sep=, e f").await, "a b\nc de,f");
    }

    #[tokio::test]
    async fn lines_round_trip_through_bytes() {
        let got = values("put a b | to-lines | from-lines").await;
        assert_eq!(got, vec![Value::str("a"), Value::str("b")]);
        assert_eq!(values("echo x y | slurp").await, vec![Value::str("x y\n")]);
    }

    #[tokio::test]
    async fn all_one_count() {
        assert_eq!(values("all [a b]").await, vec![Value::str("a"), Value::str("b")]);
        assert_eq!(values("put x | one").await, vec![Value::str("x")]);
        assert_eq!(values("put a b c | count").await, vec![Value::from(3i64)]);
        assert_eq!(values("count [a b]; count héllo").await, vec![Value::from(2i64), Value::from(5i64)]);
    }

    #[tokio::test]
    async fn one_rejects_two() {
        let out = Evaler::transient().eval_capture("test", "put a b | one").await;
        assert!(out.result.is_err());
    }

    #[tokio::test]
    async fn each_honours_break_and_continue() {
        let code = "put 1 2 3 4 | each {|x| if (eq $x 2) { continue }; if (eq $x 4) { break }; put $x }";
        assert_eq!(values(code).await, vec![Value::str("1"), Value::str("3")]);
    }
}
