//! The frame-based evaluator.
//!
//! ```text
//!   ChunkOp ─▶ PipelineOp ─▶ FormOp ─▶ builtin / closure / external
//!                  │
//!                  └─ one task per stage, ports wired stage to stage,
//!                     every stage awaited, outcomes collapsed in order
//! ```

mod call;
mod exception;
mod exec;
mod external;
mod frame;
mod ns;
mod pipe;
mod port;
mod value;

pub use call::call_value;
pub use exception::{Cause, ExecResult, Exception, Flow, PipelineError, StackEntry};
pub use frame::{Frame, Prepared};
pub use ns::{new_cell, Cell, Ns, NsBuilder, Var};
pub use pipe::{pipe, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
pub use port::{ByteIn, ByteOut, InPort, Inputs, OutPort, Ports, ValueIn, ValueOut};
pub use value::{quote, Closure, Value};

