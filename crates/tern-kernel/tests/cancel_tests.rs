//! Interrupting an evaluation: whatever it is waiting on gives up at once
//! with a canceled exception.

mod common;

use std::time::{Duration, Instant};

use tern_kernel::{Captured, Cause, EvalError, Evaler, Exception};

/// Run `code`, interrupting the evaler after 50ms. Returns the capture and
/// how long the evaluation took.
async fn interrupted(code: &str) -> (Captured, Duration) {
    common::init_tracing();
    let ev = Evaler::transient();
    let interrupter = {
        let ev = ev.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ev.interrupt();
        })
    };
    let start = Instant::now();
    let out = ev.eval_capture("[test]", code).await;
    let took = start.elapsed();
    interrupter.await.unwrap();
    (out, took)
}

fn exception(out: &Captured) -> &Exception {
    match &out.result {
        Err(EvalError::Exception(e)) => e,
        other => panic!("expected an exception, got {other:?}"),
    }
}

#[tokio::test]
async fn sleep_is_interrupted() {
    let (out, took) = interrupted("sleep 10s").await;
    assert!(exception(&out).is_canceled());
    assert!(took < Duration::from_secs(5), "took {took:?}");
}

#[tokio::test]
async fn loops_stop_at_the_next_form() {
    let (out, took) = interrupted("while $true { sleep 10ms }").await;
    assert!(exception(&out).is_canceled());
    assert!(took < Duration::from_secs(5), "took {took:?}");
}

#[tokio::test]
async fn blocked_pipeline_stages_are_interrupted() {
    // the producer blocks on a full channel while the reader sleeps
    let (out, took) = interrupted("range 100000 | each {|x| sleep 10s }").await;
    assert!(took < Duration::from_secs(5), "took {took:?}");
    let Cause::Pipeline(p) = &exception(&out).cause else {
        panic!("expected a pipeline error");
    };
    assert_eq!(p.len(), 2);
    assert!(p.failures().all(|(_, e)| e.is_canceled()));
}

#[tokio::test]
async fn later_evaluations_are_unaffected() {
    let ev = Evaler::transient();
    ev.interrupt();
    let out = ev.eval_capture("[test]", "sleep 1ms; put done").await;
    out.result.unwrap();
    assert_eq!(out.values, vec![tern_kernel::Value::str("done")]);
}

#[cfg(unix)]
#[tokio::test]
async fn external_wait_is_interrupted() {
    let (out, took) = interrupted("e:sleep 10").await;
    assert!(exception(&out).is_canceled());
    assert!(took < Duration::from_secs(5), "took {took:?}");
}
