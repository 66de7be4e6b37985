//! tern-glob: wildcard patterns and their filesystem expansion.
//!
//! Provides:
//! - **Pattern**: segments read from pattern text through the shared rune
//!   [`Lexer`](tern_types::Lexer) (`?`, `*`, `**`, `/`, literals with `\` escapes)
//! - **matches**: whole-path matching, with `*`/`?` confined to one path
//!   component and `**` spanning components; wildcards never match a
//!   leading `.` of a component
//! - **expand**: directory walking, generic over `GlobFs`
//!
//! The walker is generic over `GlobFs`, a minimal read-only filesystem trait,
//! so tests and embedders can expand against something other than the disk.

mod expand;
mod matcher;
mod parse;

pub use expand::{expand, GlobEntry, GlobError, GlobFs, RealFs};
pub use matcher::matches;
pub use parse::{escape, Pattern, Segment, WildKind};
