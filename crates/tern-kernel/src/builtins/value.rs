//! Generic value builtins: eq, not, bool, to-string, kind-of.

use async_trait::async_trait;

use super::{Builtin, CallArgs};
use crate::eval::{ExecResult, Frame, NsBuilder, Value};

pub(crate) fn register(b: NsBuilder) -> NsBuilder {
    b.add_fn(Equal).add_fn(Not).add_fn(Bool).add_fn(ToStr).add_fn(KindOf)
}

/// Whether all arguments are equal to each other.
pub struct Equal;

#[async_trait]
impl Builtin for Equal {
    fn name(&self) -> &str {
        "eq"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        let all = args.args.windows(2).all(|w| w[0] == w[1]);
        frame.put(Value::Bool(all)).await
    }
}

pub struct Not;

#[async_trait]
impl Builtin for Not {
    fn name(&self) -> &str {
        "not"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(1))?;
        frame.put(Value::Bool(!args.args[0].truthy())).await
    }
}

pub struct Bool;

#[async_trait]
impl Builtin for Bool {
    fn name(&self) -> &str {
        "bool"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(1))?;
        frame.put(Value::Bool(args.args[0].truthy())).await
    }
}

/// The string form of each argument.
pub struct ToStr;

#[async_trait]
impl Builtin for ToStr {
    fn name(&self) -> &str {
        "to-string"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        for v in &args.args {
            frame.put(Value::Str(v.to_str())).await?;
        }
        Ok(())
    }
}

pub struct KindOf;

#[async_trait]
impl Builtin for KindOf {
    fn name(&self) -> &str {
        "kind-of"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        for v in &args.args {
            frame.put(Value::str(v.kind())).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{Evaler, Value};

    #[rstest]
    #[case("eq a a a", true)]
    #[case("eq a b", false)]
    #[case("eq [a [b]] [a [b]]", true)]
    #[case("eq", true)]
    #[case("not $false", true)]
    #[case("not $ok", false)]
    #[case("bool $nil", false)]
    #[case("bool ''", true)]
    #[tokio::test]
    async fn predicates(#[case] code: &str, #[case] want: bool) {
        let out = Evaler::transient().eval_capture("test", code).await;
        out.result.unwrap();
        assert_eq!(out.values, vec![Value::Bool(want)]);
    }

    #[tokio::test]
    async fn kinds_and_strings() {
        let out = Evaler::transient()
            .eval_capture("test", "kind-of a [a] [&] $nil (num 1) { }; to-string (num 0x10) [a]")
            .await;
        out.result.unwrap();
        let want: Vec<Value> = ["string", "list", "map", "nil", "number", "fn", "16", "[a]"]
            .into_iter()
            .map(Value::str)
            .collect();
        assert_eq!(out.values, want);
    }
}
