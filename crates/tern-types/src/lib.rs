//! Pure data types for tern: the rune lexer, diagnostics and job-control records.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. The
//! parser in `tern-kernel` and the pattern reader in `tern-glob` both read
//! source through [`Lexer`]; editors and language tooling consume
//! [`Diagnostic`] without pulling the evaluator in.

pub mod diag;
pub mod job;
pub mod lexer;

pub use diag::*;
pub use job::*;
pub use lexer::Lexer;
