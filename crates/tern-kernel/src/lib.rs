//! tern-kernel: the core of the tern command language.
//!
//! This crate provides:
//!
//! - **Parser**: source text to an arena syntax tree with exact ranges
//! - **Compiler**: static name resolution, then lowering to an operation tree
//! - **Evaluator**: frames, ports, concurrent pipeline stages, exceptions
//! - **Numbers**: the exact/inexact numeric tower
//! - **Job control**: OS process groups behind one contract
//! - **Builtins**: the core builtin namespace, plus the `store:` module
//! - **Scheduler**: background pipelines
//! - **Paths**: XDG-compliant path helpers

pub mod builtins;
pub mod compile;
pub mod config;
pub mod eval;
pub mod evaler;
pub mod jobctl;
pub mod mods;
pub mod num;
pub mod parse;
pub mod paths;
pub mod scheduler;

pub use builtins::{Builtin, CallArgs};
pub use config::EvalerConfig;
pub use eval::{Cause, Exception, Frame, Ns, NsBuilder, PipelineError, Ports, Value};
pub use evaler::{Captured, EvalError, Evaler};
pub use jobctl::{platform_controller, JobController};
pub use num::Num;

// Embedders usually want these without naming tern-types.
pub use tern_types::{Diagnostic, JobError, JobId, Source};

// XDG path primitives
pub use paths::{home_dir, xdg_config_home, xdg_data_home};
