//! The operation tree.
//!
//! One operation per syntax node that does something at run time. Operations
//! are immutable once built; pieces that run on their own task (pipeline
//! stages, closures, captured chunks) sit behind `Arc` so a stage can own
//! its piece.

use std::sync::Arc;

use tern_types::Span;

use crate::parse::RedirMode;

/// Where a variable's cell lives, decided at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarRef {
    /// Slot in the running closure's locals.
    Local(usize),
    /// Slot in the running closure's captured cells.
    Capture(usize),
    Global(usize),
    Builtin(usize),
    /// `E:NAME`, the process environment.
    Env(String),
    /// `ns:name`; the base names a variable holding a namespace.
    Member(Box<VarRef>, String),
}

/// Where a closure takes each captured cell from when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFrom {
    Local(usize),
    Capture(usize),
}

#[derive(Debug)]
pub struct ChunkOp {
    pub span: Span,
    pub pipelines: Vec<Arc<PipelineOp>>,
}

#[derive(Debug)]
pub struct PipelineOp {
    pub span: Span,
    pub forms: Vec<Arc<FormOp>>,
    pub background: bool,
}

#[derive(Debug)]
pub struct FormOp {
    pub span: Span,
    pub kind: FormKind,
    pub redirs: Vec<RedirOp>,
}

#[derive(Debug)]
pub struct RedirOp {
    pub span: Span,
    pub fd: u32,
    pub mode: RedirMode,
    pub target: ValuesOp,
}

#[derive(Debug)]
pub enum FormKind {
    Call {
        head: HeadOp,
        args: Vec<ValuesOp>,
        opts: Vec<OptOp>,
    },
    Var {
        targets: Vec<LValue>,
        values: Option<Vec<ValuesOp>>,
    },
    Set {
        targets: Vec<LValue>,
        values: Vec<ValuesOp>,
    },
    Del {
        targets: Vec<LValue>,
    },
    Fn {
        target: VarRef,
        lambda: Arc<LambdaOp>,
    },
    If {
        branches: Vec<(ValuesOp, Arc<LambdaOp>)>,
        otherwise: Option<Arc<LambdaOp>>,
    },
    While {
        cond: ValuesOp,
        body: Arc<LambdaOp>,
        otherwise: Option<Arc<LambdaOp>>,
    },
    For {
        var: LValue,
        iterable: ValuesOp,
        body: Arc<LambdaOp>,
        otherwise: Option<Arc<LambdaOp>>,
    },
    Try {
        body: Arc<LambdaOp>,
        catch: Option<(Option<LValue>, Arc<LambdaOp>)>,
        otherwise: Option<Arc<LambdaOp>>,
        finally: Option<Arc<LambdaOp>>,
    },
    And(Vec<ValuesOp>),
    Or(Vec<ValuesOp>),
    Use {
        target: VarRef,
        module: String,
    },
    /// A form that compiled to nothing, e.g. after an error.
    Nop,
}

#[derive(Debug)]
pub enum HeadOp {
    /// A visible `name~` variable.
    Var(VarRef),
    /// A bareword naming no function: looked up as a command at run time.
    External(String),
    /// Anything else; must evaluate to one callable or command name.
    Values(ValuesOp),
}

#[derive(Debug)]
pub struct OptOp {
    pub span: Span,
    pub name: String,
    pub value: ValuesOp,
}

/// Assignment target: a variable plus optional index path.
#[derive(Debug)]
pub struct LValue {
    pub span: Span,
    pub name: String,
    pub var: VarRef,
    pub indices: Vec<ValuesOp>,
    /// `@name`: takes the remaining values as a list.
    pub rest: bool,
}

#[derive(Debug)]
pub struct ValuesOp {
    pub span: Span,
    pub kind: ValuesKind,
}

impl ValuesOp {
    pub fn new(span: Span, kind: ValuesKind) -> Self {
        Self { span, kind }
    }
}

#[derive(Debug)]
pub enum ValuesKind {
    Literal(String),
    Bool(bool),
    Var { var: VarRef, splice: bool },
    /// Parts written back to back: the cartesian product of their values,
    /// concatenated.
    Compound(Vec<ValuesOp>),
    Index { base: Box<ValuesOp>, indices: Vec<Vec<ValuesOp>> },
    Tilde,
    Glob(Vec<GlobPiece>),
    Capture(Arc<ChunkOp>),
    ExceptionCapture(Arc<ChunkOp>),
    List(Vec<ValuesOp>),
    Map(Vec<(ValuesOp, ValuesOp)>),
    Lambda(Arc<LambdaOp>),
}

/// One piece of a compound that contains wildcards.
#[derive(Debug)]
pub enum GlobPiece {
    /// Evaluated and matched literally.
    Values(ValuesOp),
    /// `*`, `**` or `?`.
    Wild(String),
}

#[derive(Debug)]
pub struct LambdaOp {
    pub span: Span,
    /// Positional parameter names, occupying local slots `0..params.len()`.
    pub params: Vec<String>,
    /// Index into `params` of the `@rest` parameter.
    pub rest: Option<usize>,
    /// Options and their defaults, in the slots after the parameters.
    pub opts: Vec<(String, ValuesOp)>,
    pub captures: Vec<CaptureFrom>,
    /// Total local slots, parameters included.
    pub locals: usize,
    pub body: Arc<ChunkOp>,
}

impl LambdaOp {
    pub fn opt_slot(&self, i: usize) -> usize {
        self.params.len() + i
    }
}
