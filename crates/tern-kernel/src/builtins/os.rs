//! Process-level builtins: sleep, cd.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Builtin, CallArgs};
use crate::eval::{Cause, ExecResult, Exception, Frame, NsBuilder, Value};
use crate::paths;

pub(crate) fn register(b: NsBuilder) -> NsBuilder {
    b.add_fn(Sleep).add_fn(Cd)
}

/// `sleep 1.5`, `sleep 100ms`, `sleep 2m`. Interrupted by cancellation.
pub struct Sleep;

#[async_trait]
impl Builtin for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(1, Some(1))?;
        let seconds = match &args.args[0] {
            Value::Num(n) => n.to_f64(),
            Value::Str(s) => parse_duration(s)?,
            other => return Err(Cause::wrong_type("number or duration", other.kind()).into()),
        };
        if !(seconds >= 0.0 && seconds.is_finite()) {
            return Err(Cause::bad_value("duration", "non-negative", args.args[0].repr()).into());
        }
        tokio::select! {
            biased;
            _ = frame.cancel_token().cancelled() => Err(Cause::Canceled.into()),
            _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => Ok(()),
        }
    }
}

/// Seconds in a duration with an optional `ms`, `s`, `m` or `h` suffix.
fn parse_duration(s: &str) -> Result<f64, Cause> {
    let s = s.trim();
    let (digits, scale) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 0.001)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1.0)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60.0)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3600.0)
    } else {
        (s, 1.0)
    };
    digits
        .parse::<f64>()
        .map(|n| n * scale)
        .map_err(|_| Cause::bad_value("duration", "number with optional ms/s/m/h suffix", s.to_string()))
}

/// Change the process's working directory; home if no argument.
pub struct Cd;

#[async_trait]
impl Builtin for Cd {
    fn name(&self) -> &str {
        "cd"
    }

    async fn call(&self, _frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(1))?;
        let dir = match args.args.first() {
            Some(v) => PathBuf::from(v.to_str()),
            None => paths::home_dir().ok_or_else(|| Exception::fail("cannot determine home directory"))?,
        };
        std::env::set_current_dir(&dir).map_err(|e| Exception::fail(format!("cd {}: {e}", dir.display())))?;
        debug!(dir = %dir.display(), "changed directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use rstest::rstest;

    use super::*;
    use crate::Evaler;

    #[rstest]
    #[case("2", 2.0)]
    #[case("1.5s", 1.5)]
    #[case("250ms", 0.25)]
    #[case("2m", 120.0)]
    #[case("1h", 3600.0)]
    fn durations(#[case] text: &str, #[case] want: f64) {
        assert_eq!(parse_duration(text).unwrap(), want);
    }

    #[test]
    fn bad_duration() {
        assert!(parse_duration("soon").is_err());
    }

    #[tokio::test]
    async fn sleep_is_interruptible() {
        let ev = Evaler::transient();
        let interrupter = ev.clone();
        let start = Instant::now();
        let (out, ()) = tokio::join!(ev.eval_capture("t", "sleep 30"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            interrupter.interrupt();
        });
        let err = out.result.unwrap_err();
        assert!(err.exception().is_some_and(|e| e.is_canceled()));
        assert!(start.elapsed() < Duration::from_secs(10));
        // the next evaluation runs with a fresh token
        ev.eval_capture("t", "sleep 0").await.result.unwrap();
    }

    #[tokio::test]
    async fn cd_to_missing_dir_fails() {
        let out = Evaler::transient()
            .eval_capture("t", "cd /nonexistent/tern-test-dir")
            .await;
        assert!(out.result.is_err());
    }
}
