//! The evaluator context.
//!
//! An [`Evaler`] owns everything that outlives a single piece of code:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          Evaler                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────┐  │
//! │  │  builtins   │  │   globals   │  │     modules      │  │
//! │  │  (fixed Ns) │  │ (growable)  │  │ (for `use name`) │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────┘  │
//! │  ┌──────────────────────────┐  ┌──────────────────────┐  │
//! │  │  JobController (OS jobs) │  │  BackgroundJobs (&)  │  │
//! │  └──────────────────────────┘  └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each call to [`Evaler::eval`] parses, compiles against the current
//! globals, and runs the result in a fresh top-level frame. Globals declared
//! by one call are visible to the next.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::Context;
use tern_types::{Diagnostic, Source};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::builtins;
use crate::compile::{compile, ChunkOp, StaticNs};
use crate::config::EvalerConfig;
use crate::eval::{
    new_cell, pipe, ByteOut, Cell, Exception, Flow, Frame, InPort, Ns, OutPort, Ports, Value, ValueOut,
};
use crate::jobctl::{platform_controller, JobController};
use crate::parse::parse;
use crate::scheduler::BackgroundJobs;

/// Why an evaluation did not complete.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{}", render(.0))]
    Parse(Vec<Diagnostic>),

    #[error("{}", render(.0))]
    Compile(Vec<Diagnostic>),

    #[error(transparent)]
    Exception(#[from] Exception),
}

impl EvalError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            EvalError::Parse(d) | EvalError::Compile(d) => d,
            EvalError::Exception(_) => &[],
        }
    }

    pub fn exception(&self) -> Option<&Exception> {
        match self {
            EvalError::Exception(e) => Some(e),
            _ => None,
        }
    }
}

fn render(diags: &[Diagnostic]) -> String {
    diags.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
}

/// What [`Evaler::eval_capture`] collected.
#[derive(Debug)]
pub struct Captured {
    pub values: Vec<Value>,
    pub bytes: Vec<u8>,
    pub result: Result<(), EvalError>,
}

impl Captured {
    /// The byte output as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

pub(crate) struct Globals {
    names: StaticNs,
    cells: Vec<Cell>,
}

impl Globals {
    /// Give every slot the compiler handed out a cell.
    fn sync(&mut self) {
        while self.cells.len() < self.names.len() {
            self.cells.push(new_cell(Value::Nil));
        }
    }
}

pub(crate) struct EvalerInner {
    pub(crate) config: EvalerConfig,
    pub(crate) builtins: Ns,
    builtin_names: StaticNs,
    globals: Mutex<Globals>,
    modules: RwLock<HashMap<String, Arc<Ns>>>,
    pub(crate) jobs: Arc<dyn JobController>,
    pub(crate) background: BackgroundJobs,
    cancel: Mutex<CancellationToken>,
}

impl EvalerInner {
    fn globals(&self) -> MutexGuard<'_, Globals> {
        self.globals.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn global(&self, slot: usize) -> Option<Cell> {
        self.globals().cells.get(slot).cloned()
    }

    pub(crate) fn module(&self, name: &str) -> Option<Arc<Ns>> {
        self.modules.read().unwrap_or_else(|e| e.into_inner()).get(name).cloned()
    }

    fn module_names(&self) -> HashSet<String> {
        self.modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Evaluates tern code. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Evaler {
    inner: Arc<EvalerInner>,
}

impl Evaler {
    pub fn new(config: EvalerConfig) -> Self {
        Self::with_job_controller(config, platform_controller())
    }

    /// An evaluator whose OS jobs go through `jobs`.
    pub fn with_job_controller(config: EvalerConfig, jobs: Arc<dyn JobController>) -> Self {
        let builtins = builtins::ns();
        let builtin_names = builtins.static_ns();
        debug!(name = %config.name, builtins = builtins.len(), "evaler created");
        Self {
            inner: Arc::new(EvalerInner {
                config,
                builtins,
                builtin_names,
                globals: Mutex::new(Globals {
                    names: StaticNs::new(),
                    cells: Vec::new(),
                }),
                modules: RwLock::new(HashMap::new()),
                jobs,
                background: BackgroundJobs::new(),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Evaluator with [`EvalerConfig::transient`].
    pub fn transient() -> Self {
        Self::new(EvalerConfig::transient())
    }

    pub fn config(&self) -> &EvalerConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Make `ns` importable with `use <name>`. Replaces a module of the same name.
    pub fn add_module(&self, ns: Ns) {
        let name = ns.name().to_string();
        debug!(module = %name, "module registered");
        self.inner
            .modules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, Arc::new(ns));
    }

    /// Parse and compile diagnostics for `source`, without running it or
    /// declaring its globals.
    pub fn check(&self, source: &Source) -> Vec<Diagnostic> {
        let parsed = parse(source);
        if !parsed.is_ok() {
            return parsed.errors;
        }
        let mut names = self.inner.globals().names.clone();
        match compile(&parsed.tree, &self.inner.builtin_names, &mut names, &self.inner.module_names()) {
            Ok(_) => Vec::new(),
            Err(errors) => errors,
        }
    }

    fn compile(&self, source: &Source) -> Result<Arc<ChunkOp>, EvalError> {
        let parsed = parse(source);
        if !parsed.is_ok() {
            return Err(EvalError::Parse(parsed.errors));
        }
        let modules = self.inner.module_names();
        let mut globals = self.inner.globals();
        let op = compile(&parsed.tree, &self.inner.builtin_names, &mut globals.names, &modules)
            .map_err(EvalError::Compile)?;
        globals.sync();
        Ok(op)
    }

    /// Run `source` with the given ports.
    ///
    /// A top-level `return` ends the code early without error.
    #[instrument(level = "info", skip(self, source, ports), fields(name = %source.name(), len = source.code().len()))]
    pub async fn eval(&self, source: Source, ports: Ports) -> Result<(), EvalError> {
        let op = self.compile(&source)?;
        let frame = Frame::top(self.inner.clone(), source, ports, self.inner.cancel_token());
        match op.prepare(frame).run().await {
            Ok(()) => Ok(()),
            Err(e) if e.flow() == Some(Flow::Return) => Ok(()),
            Err(e) => Err(EvalError::Exception(e)),
        }
    }

    /// Run `code` with no input, collecting what it writes to its output.
    pub async fn eval_capture(&self, name: &str, code: &str) -> Captured {
        let (tx, mut rx) = mpsc::channel(self.inner.config.value_capacity);
        let (w, mut r) = pipe(self.inner.config.pipe_capacity);
        let ports = Ports {
            input: InPort::default(),
            output: OutPort {
                values: ValueOut::Chan(tx),
                bytes: ByteOut::Pipe(Arc::new(w)),
            },
            error: OutPort::default(),
        };
        let run = self.eval(Source::new(name, code), ports);
        let values = async {
            let mut values = Vec::new();
            while let Some(v) = rx.recv().await {
                values.push(v);
            }
            values
        };
        let bytes = async {
            let mut buf = Vec::new();
            // a read error only truncates the capture
            let _ = r.read_to_end(&mut buf).await;
            buf
        };
        let (result, values, bytes) = tokio::join!(run, values, bytes);
        Captured { values, bytes, result }
    }

    /// Read and run a file with the process's stdio.
    pub async fn eval_file(&self, path: &Path) -> anyhow::Result<()> {
        let code = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let source = Source::new(path.display().to_string(), code);
        self.eval(source, Ports::stdio())
            .await
            .with_context(|| format!("evaluating {}", path.display()))
    }

    /// Run the configured rc file, if there is one and it exists.
    pub async fn load_rc(&self) -> anyhow::Result<()> {
        let Some(path) = self.inner.config.rc_path.clone() else {
            return Ok(());
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "no rc file");
            return Ok(());
        }
        info!(path = %path.display(), "loading rc file");
        self.eval_file(&path).await.context("loading rc file")
    }

    /// Cancel every foreground evaluation now running. Later evaluations
    /// are unaffected; background jobs have their own cancellation.
    pub fn interrupt(&self) {
        let mut token = self.inner.cancel.lock().unwrap_or_else(|e| e.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    pub fn background(&self) -> &BackgroundJobs {
        &self.inner.background
    }

    pub fn job_controller(&self) -> &Arc<dyn JobController> {
        &self.inner.jobs
    }

    /// Current value of a global variable.
    pub fn global(&self, name: &str) -> Option<Value> {
        let globals = self.inner.globals();
        let slot = globals.names.get(name)?;
        globals.cells.get(slot).map(|c| c.get())
    }

    /// Visible global names, in declaration order.
    pub fn global_names(&self) -> Vec<String> {
        self.inner.globals().names.visible().map(str::to_string).collect()
    }

    /// Cancel background jobs and forget every OS job.
    pub fn close(&self) {
        self.inner.background.cancel_all();
        if let Err(e) = self.inner.jobs.close() {
            debug!("closing job controller: {e}");
        }
    }
}
