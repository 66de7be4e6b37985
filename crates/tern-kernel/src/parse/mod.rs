//! Source text to syntax tree.

pub mod ast;
mod parser;

pub use ast::{
    Array, Chunk, Compound, Form, Indexing, MapPair, Node, NodeId, NodeKind, Pipeline, Primary, PrimaryKind, Redir,
    RedirMode, Tree,
};
pub use parser::{parse, Parsed};
