//! Two-pass compiler from syntax tree to operation tree.
//!
//! Pass 1 ([`resolve`]) records the names each scope declares and where
//! they become visible. Pass 2 ([`lower`]) walks the tree again and emits
//! operations, resolving every variable read to a slot:
//!
//! ```text
//!   local ──▶ enclosing lambdas (captured) ──▶ global ──▶ builtin
//! ```
//!
//! Reads that resolve nowhere are compile errors. Errors do not stop the
//! pass; siblings keep compiling so the caller gets every diagnostic.

mod lower;
pub mod op;
pub mod resolve;
pub mod scope;

use std::collections::HashSet;
use std::sync::Arc;

use tern_types::Diagnostic;

use crate::parse::Tree;
pub use op::*;
pub use resolve::{resolve, Decl, DeclKind, StaticScopes};
pub use scope::StaticNs;

/// Compile a parsed tree.
///
/// `globals` gains the top-level declarations only when compilation
/// succeeds; a failed compile leaves it untouched.
pub fn compile(
    tree: &Tree,
    builtins: &StaticNs,
    globals: &mut StaticNs,
    modules: &HashSet<String>,
) -> Result<Arc<ChunkOp>, Vec<Diagnostic>> {
    let scopes = resolve(tree);
    let mut working = globals.clone();
    let mut lowerer = lower::Lowerer::new(tree, &scopes, builtins, &mut working, modules);
    let op = lowerer.top();
    let errors = std::mem::take(&mut lowerer.errors);
    if errors.is_empty() {
        *globals = working;
        Ok(op)
    } else {
        Err(errors)
    }
}
