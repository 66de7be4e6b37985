//! Syntax tree types.
//!
//! The tree is an arena: nodes live in one `Vec` owned by [`Tree`] and refer
//! to each other by [`NodeId`]. A node owns its children (the ordered id
//! list); the `parent` link is only an index used to walk upward.
//!
//! Every node records the byte span it covers. For any node with children,
//! the children are contiguous and in order, start at the node's start and
//! end at its end, so concatenating the children's text reproduces the
//! node's text exactly. Whitespace, punctuation and comments inside a node
//! are [`NodeKind::Sep`] leaves to make that hold.

use std::fmt::Write as _;

use tern_types::{Source, Span};

/// Index of a node in its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// One grammar production.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Pipelines separated by newlines or `;`.
    Chunk(Chunk),
    /// Forms joined by `|`, optionally backgrounded with `&`.
    Pipeline(Pipeline),
    /// A command: head, arguments, `&name=value` options and redirections.
    Form(Form),
    Redir(Redir),
    /// `&key=value`, as a form option, a lambda option or a map entry.
    MapPair(MapPair),
    /// Indexings written back to back, which concatenate.
    Compound(Compound),
    /// A primary followed by zero or more `[...]` indices.
    Indexing(Indexing),
    /// Whitespace-separated compounds inside brackets.
    Array(Array),
    Primary(Primary),
    /// Whitespace, punctuation or a comment.
    Sep,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub pipelines: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub forms: Vec<NodeId>,
    pub background: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    /// Missing only when the form failed to parse.
    pub head: Option<NodeId>,
    pub args: Vec<NodeId>,
    pub opts: Vec<NodeId>,
    pub redirs: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirMode {
    /// `<`
    Read,
    /// `>`
    Write,
    /// `<>`
    ReadWrite,
    /// `>>`
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redir {
    /// Explicit file descriptor written before the operator.
    pub fd: Option<u32>,
    pub mode: RedirMode,
    pub target: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapPair {
    pub key: Option<NodeId>,
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    pub indexings: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Indexing {
    pub head: NodeId,
    /// One [`Array`] per `[...]`.
    pub indices: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    pub compounds: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKind {
    Bareword,
    SingleQuoted,
    DoubleQuoted,
    /// `$name` or `$@name`.
    Variable,
    /// `*`, `**` or `?`.
    Wildcard,
    /// A leading `~`.
    Tilde,
    /// `(chunk)`
    OutputCapture,
    /// `?(chunk)`
    ExceptionCapture,
    /// `[a b c]`
    List,
    /// `[&k=v]`
    Map,
    /// `{|params &opt=default| body}`
    Lambda,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primary {
    pub kind: PrimaryKind,
    /// Unquoted text for words and strings, the name for variables, the
    /// wildcard itself for wildcards.
    pub value: String,
    /// `$@name`
    pub splice: bool,
    /// List elements or lambda parameters.
    pub elements: Vec<NodeId>,
    /// Map entries or lambda options.
    pub pairs: Vec<NodeId>,
    /// Body of a capture or lambda.
    pub chunk: Option<NodeId>,
}

impl Primary {
    pub fn new(kind: PrimaryKind) -> Self {
        Self {
            kind,
            value: String::new(),
            splice: false,
            elements: Vec::new(),
            pairs: Vec::new(),
            chunk: None,
        }
    }
}

/// A parsed source.
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) source: Source,
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
}

impl Tree {
    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    /// Exact source text covered by the node.
    pub fn text(&self, id: NodeId) -> &str {
        self.source.slice(self.span(id))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// All node ids, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn chunk(&self, id: NodeId) -> Option<&Chunk> {
        match self.kind(id) {
            NodeKind::Chunk(c) => Some(c),
            _ => None,
        }
    }

    pub fn pipeline(&self, id: NodeId) -> Option<&Pipeline> {
        match self.kind(id) {
            NodeKind::Pipeline(p) => Some(p),
            _ => None,
        }
    }

    pub fn form(&self, id: NodeId) -> Option<&Form> {
        match self.kind(id) {
            NodeKind::Form(f) => Some(f),
            _ => None,
        }
    }

    pub fn compound(&self, id: NodeId) -> Option<&Compound> {
        match self.kind(id) {
            NodeKind::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn primary(&self, id: NodeId) -> Option<&Primary> {
        match self.kind(id) {
            NodeKind::Primary(p) => Some(p),
            _ => None,
        }
    }

    pub fn map_pair(&self, id: NodeId) -> Option<&MapPair> {
        match self.kind(id) {
            NodeKind::MapPair(p) => Some(p),
            _ => None,
        }
    }

    /// The primary a compound consists of, if it is a single un-indexed one.
    pub fn sole_primary(&self, compound: NodeId) -> Option<&Primary> {
        let c = self.compound(compound)?;
        let [only] = c.indexings.as_slice() else {
            return None;
        };
        match self.kind(*only) {
            NodeKind::Indexing(ix) if ix.indices.is_empty() => self.primary(ix.head),
            _ => None,
        }
    }

    /// The text of a compound that is a single bareword.
    pub fn bareword(&self, compound: NodeId) -> Option<&str> {
        self.sole_primary(compound)
            .filter(|p| p.kind == PrimaryKind::Bareword)
            .map(|p| p.value.as_str())
    }

    /// Innermost enclosing node (including `id` itself) matching `pred`.
    pub fn enclosing(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if pred(self.kind(n)) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Compact s-expression dump, separators omitted, single-child
    /// compound/indexing wrappers collapsed.
    pub fn sexpr(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_sexpr(id, &mut out);
        out
    }

    fn write_list(&self, ids: &[NodeId], out: &mut String) {
        for id in ids {
            out.push(' ');
            self.write_sexpr(*id, out);
        }
    }

    fn write_sexpr(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Chunk(c) => {
                out.push_str("(chunk");
                self.write_list(&c.pipelines, out);
                out.push(')');
            }
            NodeKind::Pipeline(p) => {
                out.push_str(if p.background { "(pipeline&" } else { "(pipeline" });
                self.write_list(&p.forms, out);
                out.push(')');
            }
            NodeKind::Form(f) => {
                out.push_str("(form");
                self.write_list(f.head.as_slice(), out);
                self.write_list(&f.args, out);
                self.write_list(&f.opts, out);
                self.write_list(&f.redirs, out);
                out.push(')');
            }
            NodeKind::Redir(r) => {
                let op = match r.mode {
                    RedirMode::Read => "<",
                    RedirMode::Write => ">",
                    RedirMode::ReadWrite => "<>",
                    RedirMode::Append => ">>",
                };
                let _ = write!(out, "(redir {}{op}", r.fd.map(|f| f.to_string()).unwrap_or_default());
                self.write_list(r.target.as_slice(), out);
                out.push(')');
            }
            NodeKind::MapPair(p) => {
                out.push_str("(pair");
                self.write_list(p.key.as_slice(), out);
                self.write_list(p.value.as_slice(), out);
                out.push(')');
            }
            NodeKind::Compound(c) => {
                if let [only] = c.indexings.as_slice() {
                    self.write_sexpr(*only, out);
                } else {
                    out.push_str("(concat");
                    self.write_list(&c.indexings, out);
                    out.push(')');
                }
            }
            NodeKind::Indexing(ix) => {
                if ix.indices.is_empty() {
                    self.write_sexpr(ix.head, out);
                } else {
                    out.push_str("(index ");
                    self.write_sexpr(ix.head, out);
                    self.write_list(&ix.indices, out);
                    out.push(')');
                }
            }
            NodeKind::Array(a) => {
                out.push('[');
                let mut first = true;
                for c in &a.compounds {
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    self.write_sexpr(*c, out);
                }
                out.push(']');
            }
            NodeKind::Primary(p) => self.write_primary(p, out),
            NodeKind::Sep => out.push_str("(sep)"),
        }
    }

    fn write_primary(&self, p: &Primary, out: &mut String) {
        match p.kind {
            PrimaryKind::Bareword => out.push_str(&p.value),
            PrimaryKind::SingleQuoted | PrimaryKind::DoubleQuoted => {
                let _ = write!(out, "{:?}", p.value);
            }
            PrimaryKind::Variable => {
                out.push('$');
                if p.splice {
                    out.push('@');
                }
                out.push_str(&p.value);
            }
            PrimaryKind::Wildcard => {
                let _ = write!(out, "(wild {})", p.value);
            }
            PrimaryKind::Tilde => out.push_str("(tilde)"),
            PrimaryKind::OutputCapture | PrimaryKind::ExceptionCapture => {
                out.push_str(if p.kind == PrimaryKind::OutputCapture { "(capture" } else { "(try-capture" });
                self.write_list(p.chunk.as_slice(), out);
                out.push(')');
            }
            PrimaryKind::List => {
                out.push_str("(list");
                self.write_list(&p.elements, out);
                out.push(')');
            }
            PrimaryKind::Map => {
                out.push_str("(map");
                self.write_list(&p.pairs, out);
                out.push(')');
            }
            PrimaryKind::Lambda => {
                out.push_str("(lambda [");
                let mut first = true;
                for e in &p.elements {
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    self.write_sexpr(*e, out);
                }
                out.push(']');
                self.write_list(&p.pairs, out);
                self.write_list(p.chunk.as_slice(), out);
                out.push(')');
            }
        }
    }
}
