//! Recursive-descent parser working directly on runes.
//!
//! There is no token stream. Each rule peeks with `next` + `backup`, opens
//! its node (which links it under the parent), parses children, and closes
//! the node at the current position. Separators consumed inside a node
//! become `Sep` children so ranges tile exactly.

use tern_types::{Diagnostic, Lexer, Source, Span};

use super::ast::*;

/// Result of parsing: a tree (always) and the errors met along the way.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub tree: Tree,
    pub errors: Vec<Diagnostic>,
}

impl Parsed {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a whole source as a chunk.
pub fn parse(source: &Source) -> Parsed {
    let code = source.code();
    let mut p = Parser {
        lx: Lexer::new(code),
        source: source.clone(),
        nodes: Vec::new(),
        errors: Vec::new(),
    };
    let root = p.chunk(None, None);
    let tree = Tree {
        source: source.clone(),
        nodes: p.nodes,
        root,
    };
    Parsed { tree, errors: p.errors }
}

/// Where a bareword is being read; decides which runes it may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Normal,
    /// Command heads may also contain `<` and `>`.
    Head,
    /// Option and map keys stop at `=`.
    Key,
}

fn is_bareword_rune(r: char, ctx: Ctx) -> bool {
    match r {
        '<' | '>' => ctx == Ctx::Head,
        '=' => ctx != Ctx::Key,
        '!' | '%' | '+' | ',' | '-' | '.' | '/' | ':' | '@' | '_' => true,
        r if r.is_ascii_alphanumeric() => true,
        r => !r.is_ascii() && !r.is_whitespace() && !r.is_control(),
    }
}

fn is_variable_rune(r: char) -> bool {
    r.is_alphanumeric() || matches!(r, '-' | '_' | ':' | '~')
}

fn starts_primary(r: char, ctx: Ctx) -> bool {
    matches!(r, '\'' | '"' | '$' | '*' | '?' | '(' | '[' | '{') || is_bareword_rune(r, ctx)
}

fn starts_compound(r: char, ctx: Ctx) -> bool {
    r == '~' || starts_primary(r, ctx)
}

struct Parser<'a> {
    lx: Lexer<'a>,
    source: Source,
    nodes: Vec<Node>,
    errors: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    // ========================================================================
    // Rune helpers
    // ========================================================================

    fn peek(&mut self) -> Option<char> {
        let r = self.lx.next();
        self.lx.backup();
        r
    }

    /// The rune after the next one.
    fn peek2(&mut self) -> Option<char> {
        let first = self.lx.next();
        let second = self.lx.next();
        self.lx.backup();
        self.lx.backup();
        first.and(second)
    }

    fn pos(&self) -> usize {
        self.lx.pos()
    }

    fn error(&mut self, at: Span, message: impl Into<String>) {
        self.errors.push(Diagnostic::parse(message, &self.source, at));
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let pos = self.pos();
        let end = self.peek().map(|r| pos + r.len_utf8()).unwrap_or(pos);
        self.error(Span::new(pos, end), message);
    }

    // ========================================================================
    // Node bookkeeping
    // ========================================================================

    fn open(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let pos = self.pos();
        self.nodes.push(Node {
            kind: NodeKind::Sep,
            span: Span::new(pos, pos),
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        id
    }

    fn close(&mut self, id: NodeId, kind: NodeKind) {
        let end = self.pos();
        let node = &mut self.nodes[id.index()];
        node.kind = kind;
        node.span.end = end;
    }

    /// Record `start..pos` as a separator under `parent`, merging with a
    /// directly preceding separator.
    fn sep_from(&mut self, parent: NodeId, start: usize) {
        let end = self.pos();
        if end == start {
            return;
        }
        if let Some(&last) = self.nodes[parent.index()].children.last() {
            let node = &mut self.nodes[last.index()];
            if node.kind == NodeKind::Sep && node.span.end == start {
                node.span.end = end;
                return;
            }
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: NodeKind::Sep,
            span: Span::new(start, end),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
    }

    /// Consume one rune into a separator.
    fn sep_rune(&mut self, parent: NodeId) {
        let start = self.pos();
        self.lx.next();
        self.sep_from(parent, start);
    }

    /// Spaces, tabs and line continuations.
    fn inline_space(&mut self, parent: NodeId) -> bool {
        let start = self.pos();
        loop {
            match self.lx.next() {
                Some(' ' | '\t') => {}
                Some('\\') => match self.lx.next() {
                    Some('\n') => {}
                    Some('\r') if self.peek() == Some('\n') => {
                        self.lx.next();
                    }
                    _ => {
                        self.lx.backup();
                        self.lx.backup();
                        break;
                    }
                },
                _ => {
                    self.lx.backup();
                    break;
                }
            }
        }
        self.sep_from(parent, start);
        self.pos() > start
    }

    /// Inline space plus newlines.
    fn space_and_newlines(&mut self, parent: NodeId) {
        loop {
            let before = self.pos();
            self.inline_space(parent);
            if matches!(self.peek(), Some('\n' | '\r')) {
                self.sep_rune(parent);
            }
            if self.pos() == before {
                break;
            }
        }
    }

    /// Separators allowed between pipelines: spaces, newlines, `;` and comments.
    fn chunk_seps(&mut self, parent: NodeId) {
        loop {
            let before = self.pos();
            self.space_and_newlines(parent);
            match self.peek() {
                Some(';') => self.sep_rune(parent),
                Some('#') => {
                    let start = self.pos();
                    while !matches!(self.lx.next(), Some('\n') | None) {}
                    self.lx.backup();
                    self.sep_from(parent, start);
                }
                _ => {}
            }
            if self.pos() == before {
                break;
            }
        }
    }

    /// Consume `want` into a separator or report that it should be there.
    fn expect(&mut self, parent: NodeId, want: char) -> bool {
        if self.peek() == Some(want) {
            self.sep_rune(parent);
            true
        } else {
            self.error_here(format!("should be '{want}'"));
            false
        }
    }

    // ========================================================================
    // Grammar rules
    // ========================================================================

    /// `close` is the rune that ends a nested chunk.
    fn chunk(&mut self, parent: Option<NodeId>, close: Option<char>) -> NodeId {
        let id = self.open(parent);
        let mut pipelines = Vec::new();
        loop {
            self.chunk_seps(id);
            let Some(r) = self.peek() else { break };
            if Some(r) == close {
                break;
            }
            if starts_compound(r, Ctx::Head) {
                pipelines.push(self.pipeline(id));
            } else {
                self.error_here("unexpected rune");
                self.sep_rune(id);
            }
        }
        self.close(id, NodeKind::Chunk(Chunk { pipelines }));
        id
    }

    fn pipeline(&mut self, parent: NodeId) -> NodeId {
        let id = self.open(Some(parent));
        let mut forms = vec![self.form(id)];
        let mut background = false;
        loop {
            match self.peek() {
                Some('|') => {
                    self.sep_rune(id);
                    self.space_and_newlines(id);
                    match self.peek() {
                        Some(r) if starts_compound(r, Ctx::Head) => forms.push(self.form(id)),
                        _ => {
                            self.error_here("should be form");
                            break;
                        }
                    }
                }
                Some('&') => {
                    self.sep_rune(id);
                    background = true;
                    self.inline_space(id);
                    break;
                }
                _ => break,
            }
        }
        self.close(id, NodeKind::Pipeline(Pipeline { forms, background }));
        id
    }

    fn form(&mut self, parent: NodeId) -> NodeId {
        let id = self.open(Some(parent));
        let mut form = Form::default();
        self.inline_space(id);
        match self.peek() {
            Some(r) if starts_compound(r, Ctx::Head) => form.head = Some(self.compound(id, Ctx::Head)),
            _ => {
                self.error_here("should be form head");
                if self.peek().is_some() {
                    self.sep_rune(id);
                }
            }
        }
        loop {
            self.inline_space(id);
            let Some(r) = self.peek() else { break };
            match r {
                '\n' | '\r' | ';' | '|' | ')' | '}' | '#' => break,
                '&' => match self.peek2() {
                    Some(n) if is_bareword_rune(n, Ctx::Key) => form.opts.push(self.map_pair(id)),
                    _ => break,
                },
                '<' | '>' => form.redirs.push(self.redir(id, None)),
                r if r.is_ascii_digit() && self.digits_then_redir() => {
                    let start = self.pos();
                    let mut fd: u32 = 0;
                    while let Some(d) = self.peek().and_then(|r| r.to_digit(10)) {
                        fd = fd.saturating_mul(10).saturating_add(d);
                        self.lx.next();
                    }
                    // rewind so the redirection node starts at the digits
                    while self.pos() > start {
                        self.lx.backup();
                    }
                    form.redirs.push(self.redir(id, Some(fd)));
                }
                r if starts_compound(r, Ctx::Normal) => form.args.push(self.compound(id, Ctx::Normal)),
                _ => {
                    self.error_here("unexpected rune");
                    self.sep_rune(id);
                }
            }
        }
        self.close(id, NodeKind::Form(form));
        id
    }

    /// Whether the digits at the cursor are an fd followed by `<` or `>`.
    fn digits_then_redir(&mut self) -> bool {
        let mut read = 0;
        let mut r = self.lx.next();
        while r.is_some_and(|r| r.is_ascii_digit()) {
            read += 1;
            r = self.lx.next();
        }
        let found = matches!(r, Some('<' | '>'));
        for _ in 0..=read {
            self.lx.backup();
        }
        found
    }

    fn redir(&mut self, parent: NodeId, fd: Option<u32>) -> NodeId {
        let id = self.open(Some(parent));
        let start = self.pos();
        while self.peek().is_some_and(|r| r.is_ascii_digit()) {
            self.lx.next();
        }
        let mode = match (self.lx.next(), self.peek()) {
            (Some('<'), Some('>')) => {
                self.lx.next();
                RedirMode::ReadWrite
            }
            (Some('>'), Some('>')) => {
                self.lx.next();
                RedirMode::Append
            }
            (Some('<'), _) => RedirMode::Read,
            _ => RedirMode::Write,
        };
        self.sep_from(id, start);
        self.inline_space(id);
        let target = match self.peek() {
            Some(r) if starts_compound(r, Ctx::Normal) => Some(self.compound(id, Ctx::Normal)),
            _ => {
                self.error_here("should be redirection target");
                None
            }
        };
        self.close(id, NodeKind::Redir(Redir { fd, mode, target }));
        id
    }

    /// `&key` or `&key=value`; the cursor is at `&`.
    fn map_pair(&mut self, parent: NodeId) -> NodeId {
        let id = self.open(Some(parent));
        self.sep_rune(id);
        let mut pair = MapPair::default();
        match self.peek() {
            Some(r) if starts_compound(r, Ctx::Key) => pair.key = Some(self.compound(id, Ctx::Key)),
            _ => self.error_here("should be option name"),
        }
        if self.peek() == Some('=') {
            self.sep_rune(id);
            match self.peek() {
                Some(r) if starts_compound(r, Ctx::Normal) => pair.value = Some(self.compound(id, Ctx::Normal)),
                _ => self.error_here("should be value"),
            }
        }
        self.close(id, NodeKind::MapPair(pair));
        id
    }

    fn compound(&mut self, parent: NodeId, ctx: Ctx) -> NodeId {
        let id = self.open(Some(parent));
        let mut indexings = Vec::new();
        if self.peek() == Some('~') {
            let ix = self.open(Some(id));
            let head = self.open(Some(ix));
            self.lx.next();
            let mut tilde = Primary::new(PrimaryKind::Tilde);
            tilde.value.push('~');
            self.close(head, NodeKind::Primary(tilde));
            self.close(ix, NodeKind::Indexing(Indexing { head, indices: Vec::new() }));
            indexings.push(ix);
        }
        while let Some(r) = self.peek() {
            if !starts_primary(r, ctx) {
                break;
            }
            indexings.push(self.indexing(id, ctx));
        }
        self.close(id, NodeKind::Compound(Compound { indexings }));
        id
    }

    fn indexing(&mut self, parent: NodeId, ctx: Ctx) -> NodeId {
        let id = self.open(Some(parent));
        let head = self.primary(id, ctx);
        let mut indices = Vec::new();
        while self.peek() == Some('[') {
            self.sep_rune(id);
            indices.push(self.array(id, ']'));
            self.expect(id, ']');
        }
        self.close(id, NodeKind::Indexing(Indexing { head, indices }));
        id
    }

    /// Compounds separated by spaces and newlines, up to `close`.
    fn array(&mut self, parent: NodeId, close: char) -> NodeId {
        let id = self.open(Some(parent));
        let mut compounds = Vec::new();
        loop {
            self.space_and_newlines(id);
            match self.peek() {
                None => break,
                Some(r) if r == close => break,
                Some(r) if starts_compound(r, Ctx::Normal) => compounds.push(self.compound(id, Ctx::Normal)),
                Some(_) => {
                    self.error_here("unexpected rune");
                    self.sep_rune(id);
                }
            }
        }
        self.close(id, NodeKind::Array(Array { compounds }));
        id
    }

    fn primary(&mut self, parent: NodeId, ctx: Ctx) -> NodeId {
        let id = self.open(Some(parent));
        let primary = match self.peek() {
            Some('\'') => self.single_quoted(),
            Some('"') => self.double_quoted(),
            Some('$') => self.variable(),
            Some('*') => {
                self.lx.next();
                let mut p = Primary::new(PrimaryKind::Wildcard);
                p.value.push('*');
                if self.peek() == Some('*') {
                    self.lx.next();
                    p.value.push('*');
                }
                p
            }
            Some('?') => {
                if self.peek2() == Some('(') {
                    let start = self.pos();
                    self.lx.next();
                    self.lx.next();
                    self.sep_from(id, start);
                    self.capture(id, PrimaryKind::ExceptionCapture)
                } else {
                    self.lx.next();
                    let mut p = Primary::new(PrimaryKind::Wildcard);
                    p.value.push('?');
                    p
                }
            }
            Some('(') => {
                self.sep_rune(id);
                self.capture(id, PrimaryKind::OutputCapture)
            }
            Some('[') => self.list_or_map(id),
            Some('{') => self.lambda(id),
            _ => self.bareword(ctx),
        };
        self.close(id, NodeKind::Primary(primary));
        id
    }

    fn bareword(&mut self, ctx: Ctx) -> Primary {
        let mut p = Primary::new(PrimaryKind::Bareword);
        while let Some(r) = self.lx.next() {
            // `~` is ordinary inside a word, only a leading one is a tilde.
            if is_bareword_rune(r, ctx) || (r == '~' && !p.value.is_empty()) {
                p.value.push(r);
            } else {
                self.lx.backup();
                break;
            }
        }
        p
    }

    fn single_quoted(&mut self) -> Primary {
        self.lx.next();
        let mut p = Primary::new(PrimaryKind::SingleQuoted);
        loop {
            match self.lx.next() {
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.lx.next();
                        p.value.push('\'');
                    } else {
                        break;
                    }
                }
                Some(r) => p.value.push(r),
                None => {
                    let end = self.pos();
                    self.error(Span::new(end, end), "string not terminated");
                    break;
                }
            }
        }
        p
    }

    fn double_quoted(&mut self) -> Primary {
        self.lx.next();
        let mut p = Primary::new(PrimaryKind::DoubleQuoted);
        loop {
            let at = self.pos();
            match self.lx.next() {
                Some('"') => break,
                Some('\\') => match self.escape() {
                    Some(r) => p.value.push(r),
                    None => {
                        let end = self.pos();
                        self.error(Span::new(at, end), "invalid escape sequence");
                    }
                },
                Some(r) => p.value.push(r),
                None => {
                    let end = self.pos();
                    self.error(Span::new(end, end), "string not terminated");
                    break;
                }
            }
        }
        p
    }

    /// The rune after a backslash inside double quotes.
    fn escape(&mut self) -> Option<char> {
        match self.lx.next()? {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'e' => Some('\x1b'),
            '0' => Some('\0'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            'x' => {
                let mut code = 0u32;
                for _ in 0..2 {
                    code = code * 16 + self.lx.next()?.to_digit(16)?;
                }
                char::from_u32(code)
            }
            'u' => {
                if self.lx.next()? != '{' {
                    return None;
                }
                let mut code = 0u32;
                let mut digits = 0;
                loop {
                    let r = self.lx.next()?;
                    if r == '}' {
                        break;
                    }
                    code = code.checked_mul(16)?.checked_add(r.to_digit(16)?)?;
                    digits += 1;
                }
                if digits == 0 {
                    return None;
                }
                char::from_u32(code)
            }
            _ => None,
        }
    }

    fn variable(&mut self) -> Primary {
        self.lx.next();
        let mut p = Primary::new(PrimaryKind::Variable);
        if self.peek() == Some('@') {
            self.lx.next();
            p.splice = true;
        }
        while let Some(r) = self.lx.next() {
            if is_variable_rune(r) {
                p.value.push(r);
            } else {
                self.lx.backup();
                break;
            }
        }
        if p.value.is_empty() {
            self.error_here("should be variable name");
        }
        p
    }

    /// Body of `(...)` or `?(...)`; the opening is already consumed.
    fn capture(&mut self, id: NodeId, kind: PrimaryKind) -> Primary {
        let mut p = Primary::new(kind);
        p.chunk = Some(self.chunk(Some(id), Some(')')));
        self.expect(id, ')');
        p
    }

    fn list_or_map(&mut self, id: NodeId) -> Primary {
        self.sep_rune(id);
        self.space_and_newlines(id);
        if self.peek() != Some('&') {
            let mut p = Primary::new(PrimaryKind::List);
            loop {
                self.space_and_newlines(id);
                match self.peek() {
                    None | Some(']') => break,
                    Some(r) if starts_compound(r, Ctx::Normal) => p.elements.push(self.compound(id, Ctx::Normal)),
                    Some(_) => {
                        self.error_here("unexpected rune");
                        self.sep_rune(id);
                    }
                }
            }
            self.expect(id, ']');
            return p;
        }

        let mut p = Primary::new(PrimaryKind::Map);
        loop {
            self.space_and_newlines(id);
            match self.peek() {
                None | Some(']') => break,
                Some('&') => match self.peek2() {
                    Some(r) if starts_compound(r, Ctx::Key) => p.pairs.push(self.map_pair(id)),
                    // the `&` of an empty map `[&]`
                    _ => self.sep_rune(id),
                },
                Some(_) => {
                    self.error_here("should be '&'");
                    self.sep_rune(id);
                }
            }
        }
        self.expect(id, ']');
        p
    }

    fn lambda(&mut self, id: NodeId) -> Primary {
        self.sep_rune(id);
        let mut p = Primary::new(PrimaryKind::Lambda);
        if self.peek() == Some('|') {
            self.sep_rune(id);
            loop {
                self.space_and_newlines(id);
                match self.peek() {
                    Some('|') => {
                        self.sep_rune(id);
                        break;
                    }
                    Some('&') => p.pairs.push(self.map_pair(id)),
                    Some(r) if starts_compound(r, Ctx::Normal) => p.elements.push(self.compound(id, Ctx::Normal)),
                    None => {
                        self.error_here("should be '|'");
                        break;
                    }
                    Some(_) => {
                        self.error_here("unexpected rune");
                        self.sep_rune(id);
                    }
                }
            }
        }
        p.chunk = Some(self.chunk(Some(id), Some('}')));
        self.expect(id, '}');
        p
    }
}
