//! Pipelines: every stage runs concurrently, every stage is waited for, and
//! failures are reported per stage.

mod common;

use std::time::{Duration, Instant};

use common::{reprs, run};
use tern_kernel::{Cause, EvalError, Exception, PipelineError};

fn pipeline_error(result: &Result<(), EvalError>) -> &PipelineError {
    match result {
        Err(EvalError::Exception(Exception {
            cause: Cause::Pipeline(p),
            ..
        })) => p,
        other => panic!("expected a pipeline error, got {other:?}"),
    }
}

#[tokio::test]
async fn values_flow_between_stages() {
    assert_eq!(
        reprs("put 1 2 3 | each {|x| put (+ $x 1) }").await,
        ["(num 2)", "(num 3)", "(num 4)"]
    );
}

#[tokio::test]
async fn bytes_flow_between_stages() {
    assert_eq!(reprs("echo hello | slurp").await, ["\"hello\\n\""]);
    assert_eq!(reprs("to-lines a b | from-lines").await, ["a", "b"]);
}

#[tokio::test]
async fn more_values_than_the_channel_holds() {
    assert_eq!(reprs("range 1000 | count").await, ["(num 1000)"]);
}

#[tokio::test]
async fn every_failure_is_kept_in_stage_order() {
    let out = run("fail a | fail b").await;
    let p = pipeline_error(&out.result);
    assert_eq!(p.len(), 2);
    assert_eq!(p.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(p.to_string(), "multiple errors in pipeline: [a, b]");
}

#[tokio::test]
async fn later_stages_run_when_an_earlier_one_fails() {
    let out = run("fail early | put still-here").await;
    assert_eq!(reprs_of(&out.values), ["still-here"]);
    let p = pipeline_error(&out.result);
    assert_eq!(p.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![0]);
}

#[tokio::test]
async fn the_pipeline_waits_for_its_slowest_stage() {
    let start = Instant::now();
    let out = run("sleep 100ms | fail fast").await;
    assert!(start.elapsed() >= Duration::from_millis(100));
    let p = pipeline_error(&out.result);
    assert_eq!(p.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);
}

#[tokio::test]
async fn a_single_stage_reports_its_own_exception() {
    let out = run("fail alone").await;
    assert!(matches!(
        &out.result,
        Err(EvalError::Exception(Exception { cause: Cause::Fail(m), .. })) if m == "alone"
    ));
}

#[tokio::test]
async fn a_pipeline_error_can_be_caught() {
    assert_eq!(
        reprs("try { fail a | nop } catch e { put caught }").await,
        ["caught"]
    );
}

fn reprs_of(values: &[tern_kernel::Value]) -> Vec<String> {
    values.iter().map(tern_kernel::Value::repr).collect()
}

#[cfg(unix)]
mod external {
    use tern_kernel::{Evaler, EvalerConfig, JobError, JobId};

    use super::*;

    /// An evaler whose externals run in process groups, without a terminal.
    fn job_controlled() -> Evaler {
        common::init_tracing();
        Evaler::new(EvalerConfig {
            job_control: true,
            ..EvalerConfig::transient()
        })
    }

    #[tokio::test]
    async fn external_output_feeds_builtins() {
        assert_eq!(reprs("e:printf 'a\\nb\\n' | from-lines").await, ["a", "b"]);
    }

    #[tokio::test]
    async fn builtin_output_feeds_externals() {
        let out = run("echo hello | e:tr a-z A-Z").await;
        out.result.as_ref().unwrap();
        assert_eq!(out.text(), "HELLO\n");
    }

    #[tokio::test]
    async fn exit_codes_are_reported_per_stage() {
        let out = run("e:sh -c 'exit 3' | e:true | e:false").await;
        let p = pipeline_error(&out.result);
        assert_eq!(p.len(), 3);
        let failures: Vec<_> = p.failures().map(|(i, e)| (i, e.cause.clone())).collect();
        assert_eq!(failures.len(), 2);
        assert!(matches!(&failures[0], (0, Cause::ExternalExit { cmd, code: 3, .. }) if cmd == "sh"));
        assert!(matches!(&failures[1], (2, Cause::ExternalExit { cmd, code: 1, .. }) if cmd == "false"));
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let out = run("tern-no-such-command-anywhere").await;
        assert!(matches!(
            &out.result,
            Err(EvalError::Exception(Exception { cause: Cause::Io(_), .. }))
        ));
    }

    #[tokio::test]
    async fn job_control_survives_a_finished_group() {
        let ev = job_controlled();
        // the second command cannot join the first one's group: it has exited
        ev.eval_capture("[test]", "if $true { e:true; e:true }").await.result.unwrap();
        for raw in [1, 2] {
            assert_eq!(ev.job_controller().inspect(JobId::from_raw(raw)), Err(JobError::NotFound));
        }

        let out = ev.eval_capture("[test]", "e:true | { sleep 200ms; e:true }").await;
        out.result.unwrap();
        ev.eval_capture("[test]", "fn twice { e:true; e:false }; try { twice } catch { put caught }")
            .await
            .result
            .unwrap();
    }

    #[tokio::test]
    async fn job_control_keeps_exit_codes() {
        let ev = job_controlled();
        let out = ev.eval_capture("[test]", "e:sh -c 'exit 4' | e:true").await;
        let p = pipeline_error(&out.result);
        assert!(matches!(p.failures().next(), Some((0, e)) if matches!(e.cause, Cause::ExternalExit { code: 4, .. })));
    }
}
