//! Numeric builtins over the exact/inexact tower.

use std::cmp::Ordering;

use async_trait::async_trait;

use super::{Builtin, CallArgs};
use crate::eval::{Cause, ExecResult, Frame, NsBuilder, Value};
use crate::num::Num;

pub(crate) fn register(b: NsBuilder) -> NsBuilder {
    let mut b = b.add_fn(ToNum).add_fn(ExactNum).add_fn(InexactNum).add_fn(Range);
    for op in [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem] {
        b = b.add_fn(Arith(op));
    }
    for op in [CmpOp::Lt, CmpOp::Le, CmpOp::Eq, CmpOp::Ne, CmpOp::Gt, CmpOp::Ge] {
        b = b.add_fn(Compare(op));
    }
    b
}

fn nums(args: &[Value]) -> Result<Vec<Num>, Cause> {
    args.iter().map(Value::as_num).collect()
}

/// `num`: parse each argument as a number.
pub struct ToNum;

#[async_trait]
impl Builtin for ToNum {
    fn name(&self) -> &str {
        "num"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        for n in nums(&args.args)? {
            frame.put(Value::Num(n)).await?;
        }
        Ok(())
    }
}

pub struct ExactNum;

#[async_trait]
impl Builtin for ExactNum {
    fn name(&self) -> &str {
        "exact-num"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(1))?;
        let n = args.args[0].as_num()?.to_exact()?;
        frame.put(Value::Num(n)).await
    }
}

pub struct InexactNum;

#[async_trait]
impl Builtin for InexactNum {
    fn name(&self) -> &str {
        "inexact-num"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(1))?;
        let n = args.args[0].as_num()?.to_inexact();
        frame.put(Value::Num(n)).await
    }
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// `+ - * / %`. With one argument `-` negates and `/` takes the reciprocal.
struct Arith(ArithOp);

impl Arith {
    fn apply(&self, args: &[Num]) -> ExecResult<Num> {
        let op = self.0;
        match (op, args) {
            (ArithOp::Add, _) => Ok(args.iter().fold(Num::Int(0), |acc, n| acc.add(n))),
            (ArithOp::Mul, _) => Ok(args.iter().fold(Num::Int(1), |acc, n| acc.mul(n))),
            (ArithOp::Sub, [only]) => Ok(only.neg()),
            (ArithOp::Div, [only]) => Ok(only.recip()?),
            (ArithOp::Sub | ArithOp::Div, [first, rest @ ..]) => {
                let mut acc = first.clone();
                for n in rest {
                    acc = match op {
                        ArithOp::Sub => acc.sub(n),
                        _ => acc.div(n)?,
                    };
                }
                Ok(acc)
            }
            (ArithOp::Rem, [a, b]) => Ok(a.rem(b)?),
            (ArithOp::Rem, _) => Err(Cause::arity("arguments", "2", args.len()).into()),
            (_, []) => Err(Cause::arity("arguments", "1 or more", 0).into()),
        }
    }
}

#[async_trait]
impl Builtin for Arith {
    fn name(&self) -> &str {
        match self.0 {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        let n = self.apply(&nums(&args.args)?)?;
        frame.put(Value::Num(n)).await
    }
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

/// Numeric comparison of each adjacent pair. Any comparison with NaN is
/// false, except `!=`.
struct Compare(CmpOp);

impl Compare {
    fn holds(&self, ord: Option<Ordering>) -> bool {
        match (self.0, ord) {
            (CmpOp::Ne, None) => true,
            (_, None) => false,
            (CmpOp::Lt, Some(o)) => o == Ordering::Less,
            (CmpOp::Le, Some(o)) => o != Ordering::Greater,
            (CmpOp::Eq, Some(o)) => o == Ordering::Equal,
            (CmpOp::Ne, Some(o)) => o != Ordering::Equal,
            (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
            (CmpOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

#[async_trait]
impl Builtin for Compare {
    fn name(&self) -> &str {
        match self.0 {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        let ns = nums(&args.args)?;
        let all = ns.windows(2).all(|w| self.holds(w[0].compare(&w[1])));
        frame.put(Value::Bool(all)).await
    }
}

/// `range [start] end &step`: numbers from start (default 0) towards end,
/// excluding end. The step defaults to 1, or -1 when counting down.
pub struct Range;

#[async_trait]
impl Builtin for Range {
    fn name(&self) -> &str {
        "range"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(2))?;
        args.only_opts(&["step"])?;
        let ns = nums(&args.args)?;
        let (start, end) = match ns.as_slice() {
            [end] => (Num::Int(0), end.clone()),
            [start, end] => (start.clone(), end.clone()),
            _ => return Err(Cause::arity("arguments", "1 to 2", ns.len()).into()),
        };
        let descending = start.compare(&end) == Some(Ordering::Greater);
        let step = match args.opt("step") {
            Some(v) => v.as_num()?,
            None if descending => Num::Int(-1),
            None => Num::Int(1),
        };
        let ascending = match step.compare(&Num::Int(0)) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Less) => false,
            _ => return Err(Cause::bad_value("step", "nonzero number", step.to_string()).into()),
        };
        let stop = if ascending { Ordering::Less } else { Ordering::Greater };
        let mut cur = start;
        while cur.compare(&end) == Some(stop) {
            frame.put(Value::Num(cur.clone())).await?;
            cur = cur.add(&step);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{Evaler, Value};

    async fn reprs(code: &str) -> Vec<String> {
        let out = Evaler::transient().eval_capture("test", code).await;
        out.result.unwrap();
        out.values.iter().map(Value::repr).collect()
    }

    #[rstest]
    #[case("+ 1 2 3", "(num 6)")]
    #[case("+", "(num 0)")]
    #[case("- 5", "(num -5)")]
    #[case("- 10 2 3", "(num 5)")]
    #[case("* 9223372036854775807 2", "(num 18446744073709551614)")]
    #[case("/ 1 3", "(num 1/3)")]
    #[case("/ 6 3", "(num 2)")]
    #[case("/ 4", "(num 1/4)")]
    #[case("% 7 3", "(num 1)")]
    #[case("exact-num 0.5", "(num 1/2)")]
    #[tokio::test]
    async fn arithmetic(#[case] code: &str, #[case] want: &str) {
        assert_eq!(reprs(code).await, vec![want.to_string()]);
    }

    #[rstest]
    #[case("< 1 2 3", "$true")]
    #[case("< 1 3 2", "$false")]
    #[case("<= 1 1 2", "$true")]
    #[case("== 1 1/1 (num 1)", "$true")]
    #[case("!= 1 2", "$true")]
    #[case(">= 3 3 1", "$true")]
    #[case("> 1/2 1/3", "$true")]
    #[tokio::test]
    async fn comparison(#[case] code: &str, #[case] want: &str) {
        assert_eq!(reprs(code).await, vec![want.to_string()]);
    }

    #[tokio::test]
    async fn division_by_exact_zero_fails() {
        let out = Evaler::transient().eval_capture("test", "/ 1 0").await;
        assert!(out.result.is_err());
        let out = Evaler::transient().eval_capture("test", "% 1 2.5").await;
        assert!(out.result.is_err());
    }

    #[tokio::test]
    async fn ranges() {
        assert_eq!(reprs("range 3").await, ["(num 0)", "(num 1)", "(num 2)"]);
        assert_eq!(reprs("range 3 0").await, ["(num 3)", "(num 2)", "(num 1)"]);
        assert_eq!(reprs("range 0 10 &step=4").await, ["(num 0)", "(num 4)", "(num 8)"]);
        let out = Evaler::transient().eval_capture("test", "range 0 1 &step=0").await;
        assert!(out.result.is_err());
    }
}
