//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use tern_kernel::{Captured, Evaler, Value};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

/// Evaluate `code` in a fresh non-interactive evaluator.
pub async fn run(code: &str) -> Captured {
    init_tracing();
    Evaler::transient().eval_capture("[test]", code).await
}

/// Evaluate `code` and return the value outputs, panicking on failure.
pub async fn values(code: &str) -> Vec<Value> {
    let out = run(code).await;
    if let Err(e) = &out.result {
        panic!("{code:?} failed: {e}");
    }
    out.values
}

/// Reprs of the value outputs, the way `put` prints them at a terminal.
pub async fn reprs(code: &str) -> Vec<String> {
    values(code).await.iter().map(Value::repr).collect()
}
