//! Lowering: syntax tree to operation tree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tern_types::{Diagnostic, Span};

use super::op::*;
use super::resolve::{module_alias, split_rest, StaticScopes};
use super::scope::StaticNs;
use crate::parse::{NodeId, NodeKind, PrimaryKind, RedirMode, Tree};

/// Locals of one lambda being lowered.
#[derive(Default)]
struct LambdaScope {
    locals: StaticNs,
    captures: Vec<CaptureFrom>,
    capture_names: HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy)]
enum Scoped {
    Local(usize),
    Capture(usize),
}

pub(crate) struct Lowerer<'a> {
    tree: &'a Tree,
    scopes: &'a StaticScopes,
    builtins: &'a StaticNs,
    globals: &'a mut StaticNs,
    modules: &'a HashSet<String>,
    lambdas: Vec<LambdaScope>,
    pub(crate) errors: Vec<Diagnostic>,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(
        tree: &'a Tree,
        scopes: &'a StaticScopes,
        builtins: &'a StaticNs,
        globals: &'a mut StaticNs,
        modules: &'a HashSet<String>,
    ) -> Self {
        Self {
            tree,
            scopes,
            builtins,
            globals,
            modules,
            lambdas: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors.push(Diagnostic::compile(message, self.tree.source(), span));
    }

    /// Lower the root chunk, declaring its hoisted functions as globals.
    pub(crate) fn top(&mut self) -> Arc<ChunkOp> {
        let root = self.tree.root();
        let hoisted: Vec<String> = self.scopes.hoisted(root).map(|d| d.name.clone()).collect();
        for name in hoisted {
            self.globals.ensure(&name);
        }
        self.chunk(root)
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn declare(&mut self, name: &str) -> VarRef {
        match self.lambdas.last_mut() {
            Some(scope) => VarRef::Local(scope.locals.add(name)),
            None => VarRef::Global(self.globals.ensure(name)),
        }
    }

    fn resolve(&mut self, name: &str) -> Option<VarRef> {
        if let Some(env) = name.strip_prefix("E:") {
            return Some(VarRef::Env(env.to_string()));
        }
        if !self.lambdas.is_empty() {
            match self.resolve_in(self.lambdas.len() - 1, name) {
                Some(Scoped::Local(i)) => return Some(VarRef::Local(i)),
                Some(Scoped::Capture(i)) => return Some(VarRef::Capture(i)),
                None => {}
            }
        }
        if let Some(slot) = self.globals.get(name) {
            return Some(VarRef::Global(slot));
        }
        if let Some(slot) = self.builtins.get(name) {
            return Some(VarRef::Builtin(slot));
        }
        // `ns:rest` through a namespace variable
        let colon = name.find(':')?;
        let (base, rest) = name.split_at(colon + 1);
        if rest.is_empty() {
            return None;
        }
        let base = self.resolve(base)?;
        Some(VarRef::Member(Box::new(base), rest.to_string()))
    }

    /// Look `name` up in lambda scope `level`, recording captures on the way
    /// in from outer lambdas.
    fn resolve_in(&mut self, level: usize, name: &str) -> Option<Scoped> {
        let scope = &self.lambdas[level];
        if let Some(slot) = scope.locals.get(name) {
            return Some(Scoped::Local(slot));
        }
        if let Some(idx) = scope.capture_names.get(name) {
            return Some(Scoped::Capture(*idx));
        }
        if level == 0 {
            return None;
        }
        let from = match self.resolve_in(level - 1, name)? {
            Scoped::Local(i) => CaptureFrom::Local(i),
            Scoped::Capture(i) => CaptureFrom::Capture(i),
        };
        let scope = &mut self.lambdas[level];
        let idx = scope.captures.len();
        scope.captures.push(from);
        scope.capture_names.insert(name.to_string(), idx);
        Some(Scoped::Capture(idx))
    }

    // ========================================================================
    // Structure
    // ========================================================================

    fn chunk(&mut self, id: NodeId) -> Arc<ChunkOp> {
        let tree = self.tree;
        let pipelines = match tree.chunk(id) {
            Some(c) => c.pipelines.iter().map(|p| self.pipeline(*p)).collect(),
            None => Vec::new(),
        };
        Arc::new(ChunkOp {
            span: tree.span(id),
            pipelines,
        })
    }

    fn pipeline(&mut self, id: NodeId) -> Arc<PipelineOp> {
        let tree = self.tree;
        let (forms, background) = match tree.pipeline(id) {
            Some(p) => (p.forms.iter().map(|f| Arc::new(self.form(*f))).collect(), p.background),
            None => (Vec::new(), false),
        };
        Arc::new(PipelineOp {
            span: tree.span(id),
            forms,
            background,
        })
    }

    fn form(&mut self, id: NodeId) -> FormOp {
        let tree = self.tree;
        let span = tree.span(id);
        let Some(form) = tree.form(id) else {
            return FormOp {
                span,
                kind: FormKind::Nop,
                redirs: Vec::new(),
            };
        };
        let redirs = form.redirs.iter().filter_map(|r| self.redir(*r)).collect();
        let Some(head) = form.head else {
            return FormOp {
                span,
                kind: FormKind::Nop,
                redirs,
            };
        };
        let args = &form.args;
        let kind = match tree.bareword(head) {
            Some("var") => self.var_form(id, args),
            Some("set") => self.set_form(span, args),
            Some("del") => self.del_form(span, args),
            Some("fn") => self.fn_form(id, args),
            Some("if") => self.if_form(span, args),
            Some("while") => self.while_form(span, args),
            Some("for") => self.for_form(id, args),
            Some("try") => self.try_form(id, args),
            Some("and") => FormKind::And(args.iter().map(|a| self.compound(*a)).collect()),
            Some("or") => FormKind::Or(args.iter().map(|a| self.compound(*a)).collect()),
            Some("use") => self.use_form(id, args),
            _ => self.call_form(head, args, &form.opts),
        };
        FormOp { span, kind, redirs }
    }

    fn redir(&mut self, id: NodeId) -> Option<RedirOp> {
        let tree = self.tree;
        let NodeKind::Redir(r) = tree.kind(id) else {
            return None;
        };
        let target = self.compound(r.target?);
        let fd = r.fd.unwrap_or(match r.mode {
            RedirMode::Read | RedirMode::ReadWrite => 0,
            _ => 1,
        });
        Some(RedirOp {
            span: tree.span(id),
            fd,
            mode: r.mode,
            target,
        })
    }

    fn call_form(&mut self, head: NodeId, args: &[NodeId], opts: &[NodeId]) -> FormKind {
        let tree = self.tree;
        // a lone `*` at the head is the multiplication builtin, not a glob
        let word = tree.bareword(head).or_else(|| {
            tree.sole_primary(head)
                .filter(|p| p.kind == PrimaryKind::Wildcard && p.value == "*")
                .map(|p| p.value.as_str())
        });
        let head = match word {
            Some(word) => match word.strip_prefix("e:") {
                Some(cmd) => HeadOp::External(cmd.to_string()),
                None => match self.resolve(&format!("{word}~")) {
                    Some(var) => HeadOp::Var(var),
                    None => HeadOp::External(word.to_string()),
                },
            },
            None => HeadOp::Values(self.compound(head)),
        };
        let args = args.iter().map(|a| self.compound(*a)).collect();
        let opts = opts.iter().filter_map(|o| self.option(*o)).collect();
        FormKind::Call { head, args, opts }
    }

    fn option(&mut self, id: NodeId) -> Option<OptOp> {
        let tree = self.tree;
        let span = tree.span(id);
        let pair = tree.map_pair(id)?;
        let Some(name) = pair.key.and_then(|k| tree.bareword(k)) else {
            self.error(span, "option name must be a bareword");
            return None;
        };
        let value = match pair.value {
            Some(v) => self.compound(v),
            None => ValuesOp::new(span, ValuesKind::Bool(true)),
        };
        Some(OptOp {
            span,
            name: name.to_string(),
            value,
        })
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn var_form(&mut self, id: NodeId, args: &[NodeId]) -> FormKind {
        let tree = self.tree;
        let eq = args.iter().position(|a| tree.bareword(*a) == Some("="));
        let (names, values) = match eq {
            Some(i) => (&args[..i], Some(&args[i + 1..])),
            None => (args, None),
        };
        if names.is_empty() {
            self.error(tree.span(id), "var needs at least one name");
            return FormKind::Nop;
        }
        // right-hand side sees the names as they were before this form
        let values = values.map(|vs| vs.iter().map(|v| self.compound(*v)).collect());

        let declared = self.scopes.decls_by_form(id);
        let mut targets = Vec::new();
        let mut rests = 0;
        for name_arg in names {
            let span = tree.span(*name_arg);
            let Some(decl) = declared.iter().find(|d| d.node == *name_arg) else {
                self.error(span, "variable name must be a bareword");
                continue;
            };
            if decl.name.is_empty() || decl.name.contains(':') {
                self.error(span, format!("invalid variable name {:?}", decl.name));
                continue;
            }
            rests += decl.rest as usize;
            let var = self.declare(&decl.name);
            targets.push(LValue {
                span,
                name: decl.name.clone(),
                var,
                indices: Vec::new(),
                rest: decl.rest,
            });
        }
        if rests > 1 {
            self.error(tree.span(id), "at most one rest variable is allowed");
        }
        FormKind::Var { targets, values }
    }

    /// An assignment target of `set` or `del`.
    fn lvalue(&mut self, id: NodeId) -> Option<LValue> {
        let tree = self.tree;
        let span = tree.span(id);
        let target = tree.compound(id).and_then(|c| match c.indexings.as_slice() {
            [only] => match tree.kind(*only) {
                NodeKind::Indexing(ix) => tree
                    .primary(ix.head)
                    .filter(|p| p.kind == PrimaryKind::Bareword)
                    .map(|p| (p.value.clone(), ix.indices.clone())),
                _ => None,
            },
            _ => None,
        });
        let Some((word, index_arrays)) = target else {
            self.error(span, "assignment target must be a bareword, optionally indexed");
            return None;
        };
        let (name, rest) = split_rest(&word);
        let Some(var) = self.resolve(name) else {
            self.error(span, format!("variable ${name} not found"));
            return None;
        };
        let mut indices = Vec::new();
        for array in index_arrays {
            let compounds = match tree.kind(array) {
                NodeKind::Array(a) => a.compounds.clone(),
                _ => Vec::new(),
            };
            match compounds.as_slice() {
                [one] => indices.push(self.compound(*one)),
                _ => self.error(tree.span(array), "index of an assignment target must be a single value"),
            }
        }
        Some(LValue {
            span,
            name: name.to_string(),
            var,
            indices,
            rest,
        })
    }

    fn set_form(&mut self, span: Span, args: &[NodeId]) -> FormKind {
        let tree = self.tree;
        let Some(eq) = args.iter().position(|a| tree.bareword(*a) == Some("=")) else {
            self.error(span, "set needs '='");
            return FormKind::Nop;
        };
        let targets: Vec<LValue> = args[..eq].iter().filter_map(|a| self.lvalue(*a)).collect();
        if targets.is_empty() && eq == 0 {
            self.error(span, "set needs at least one target");
        }
        for t in &targets {
            if matches!(t.var, VarRef::Builtin(_)) {
                self.error(t.span, format!("cannot set builtin variable ${}", t.name));
            }
        }
        let values = args[eq + 1..].iter().map(|a| self.compound(*a)).collect();
        FormKind::Set { targets, values }
    }

    fn del_form(&mut self, span: Span, args: &[NodeId]) -> FormKind {
        if args.is_empty() {
            self.error(span, "del needs at least one target");
        }
        let mut targets = Vec::new();
        for arg in args {
            let Some(target) = self.lvalue(*arg) else { continue };
            if target.indices.is_empty() {
                match target.var {
                    VarRef::Local(_) => {
                        if let Some(scope) = self.lambdas.last_mut() {
                            scope.locals.remove(&target.name);
                        }
                    }
                    VarRef::Global(_) => {
                        self.globals.remove(&target.name);
                    }
                    VarRef::Env(_) => {}
                    _ => {
                        self.error(target.span, format!("cannot delete ${}", target.name));
                        continue;
                    }
                }
            }
            targets.push(target);
        }
        FormKind::Del { targets }
    }

    fn fn_form(&mut self, id: NodeId, args: &[NodeId]) -> FormKind {
        let tree = self.tree;
        let span = tree.span(id);
        let (Some(name), Some(body), 2) = (
            args.first().and_then(|a| tree.bareword(*a)),
            args.get(1).and_then(|a| self.lambda_node(*a)),
            args.len(),
        ) else {
            self.error(span, "fn needs a name and a lambda");
            return FormKind::Nop;
        };
        let name = format!("{name}~");
        // hoisted: already declared at scope entry
        let target = match self.lambdas.last() {
            Some(scope) => scope.locals.get(&name).map(VarRef::Local),
            None => self.globals.get(&name).map(VarRef::Global),
        };
        let target = match target {
            Some(t) => t,
            None => self.declare(&name),
        };
        let lambda = self.lambda(body);
        FormKind::Fn { target, lambda }
    }

    /// The lambda primary a compound consists of.
    fn lambda_node(&self, compound: NodeId) -> Option<NodeId> {
        let tree = self.tree;
        let c = tree.compound(compound)?;
        let [only] = c.indexings.as_slice() else {
            return None;
        };
        match tree.kind(*only) {
            NodeKind::Indexing(ix) if ix.indices.is_empty() => {
                tree.primary(ix.head).filter(|p| p.kind == PrimaryKind::Lambda).map(|_| ix.head)
            }
            _ => None,
        }
    }

    fn block(&mut self, arg: Option<&NodeId>, span: Span, what: &str) -> Option<Arc<LambdaOp>> {
        match arg.and_then(|a| self.lambda_node(*a)) {
            Some(node) => Some(self.lambda(node)),
            None => {
                let span = arg.map(|a| self.tree.span(*a)).unwrap_or(span);
                self.error(span, format!("{what} must be a lambda"));
                None
            }
        }
    }

    fn if_form(&mut self, span: Span, args: &[NodeId]) -> FormKind {
        let tree = self.tree;
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut i = 0;
        loop {
            let Some(cond) = args.get(i) else {
                self.error(span, "if needs a condition");
                break;
            };
            let cond = self.compound(*cond);
            if let Some(body) = self.block(args.get(i + 1), span, "if body") {
                branches.push((cond, body));
            }
            i += 2;
            match args.get(i).and_then(|a| tree.bareword(*a)) {
                Some("elif") => i += 1,
                Some("else") => {
                    otherwise = self.block(args.get(i + 1), span, "else body");
                    i += 2;
                    break;
                }
                _ => break,
            }
        }
        if i < args.len() {
            self.error(tree.span(args[i]), "unexpected argument to if");
        }
        FormKind::If { branches, otherwise }
    }

    /// Optional trailing `else {...}` at `args[i..]`.
    fn else_clause(&mut self, span: Span, args: &[NodeId], i: usize) -> Option<Arc<LambdaOp>> {
        let tree = self.tree;
        match args.get(i) {
            None => None,
            Some(a) if tree.bareword(*a) == Some("else") => {
                if args.len() > i + 2 {
                    self.error(tree.span(args[i + 2]), "unexpected argument after else body");
                }
                self.block(args.get(i + 1), span, "else body")
            }
            Some(a) => {
                self.error(tree.span(*a), "should be 'else'");
                None
            }
        }
    }

    fn while_form(&mut self, span: Span, args: &[NodeId]) -> FormKind {
        let Some(cond) = args.first() else {
            self.error(span, "while needs a condition");
            return FormKind::Nop;
        };
        let cond = self.compound(*cond);
        let Some(body) = self.block(args.get(1), span, "while body") else {
            return FormKind::Nop;
        };
        let otherwise = self.else_clause(span, args, 2);
        FormKind::While { cond, body, otherwise }
    }

    fn for_form(&mut self, id: NodeId, args: &[NodeId]) -> FormKind {
        let tree = self.tree;
        let span = tree.span(id);
        let decl = self.scopes.decls_by_form(id).first().map(|d| (d.name.clone(), d.node));
        let (Some((name, name_node)), Some(iterable)) = (decl, args.get(1)) else {
            self.error(span, "for needs a variable name, an iterable and a body");
            return FormKind::Nop;
        };
        let iterable = self.compound(*iterable);
        let var = self.declare(&name);
        let Some(body) = self.block(args.get(2), span, "for body") else {
            return FormKind::Nop;
        };
        let otherwise = self.else_clause(span, args, 3);
        FormKind::For {
            var: LValue {
                span: tree.span(name_node),
                name,
                var,
                indices: Vec::new(),
                rest: false,
            },
            iterable,
            body,
            otherwise,
        }
    }

    fn try_form(&mut self, id: NodeId, args: &[NodeId]) -> FormKind {
        let tree = self.tree;
        let span = tree.span(id);
        let Some(body) = self.block(args.first(), span, "try body") else {
            return FormKind::Nop;
        };
        let mut catch = None;
        let mut otherwise = None;
        let mut finally = None;
        let mut i = 1;
        while i < args.len() {
            let word = tree.bareword(args[i]);
            match word {
                Some("catch") if catch.is_none() && otherwise.is_none() && finally.is_none() => {
                    let mut var = None;
                    if self.lambda_node(args.get(i + 1).copied().unwrap_or(args[i])).is_none() {
                        // catch with a variable name
                        if let Some(decl) = self.scopes.decls_by_form(id).first() {
                            let (name, node) = (decl.name.clone(), decl.node);
                            let v = self.declare(&name);
                            var = Some(LValue {
                                span: tree.span(node),
                                name,
                                var: v,
                                indices: Vec::new(),
                                rest: false,
                            });
                            i += 1;
                        }
                    }
                    match self.block(args.get(i + 1), span, "catch body") {
                        Some(b) => catch = Some((var, b)),
                        None => return FormKind::Nop,
                    }
                    i += 2;
                }
                Some("else") if otherwise.is_none() && finally.is_none() => {
                    if catch.is_none() {
                        self.error(tree.span(args[i]), "else in try needs a catch");
                    }
                    otherwise = self.block(args.get(i + 1), span, "else body");
                    i += 2;
                }
                Some("finally") if finally.is_none() => {
                    finally = self.block(args.get(i + 1), span, "finally body");
                    i += 2;
                }
                _ => {
                    self.error(tree.span(args[i]), "should be 'catch', 'else' or 'finally'");
                    break;
                }
            }
        }
        FormKind::Try {
            body,
            catch,
            otherwise,
            finally,
        }
    }

    fn use_form(&mut self, id: NodeId, args: &[NodeId]) -> FormKind {
        let tree = self.tree;
        let span = tree.span(id);
        let (Some(path), 1) = (args.first().and_then(|a| tree.bareword(*a)), args.len()) else {
            self.error(span, "use needs one module name");
            return FormKind::Nop;
        };
        let module = module_alias(path).to_string();
        if !self.modules.contains(&module) {
            self.error(tree.span(args[0]), format!("no such module: {path}"));
            return FormKind::Nop;
        }
        let target = self.declare(&format!("{module}:"));
        FormKind::Use { target, module }
    }

    // ========================================================================
    // Values
    // ========================================================================

    pub(crate) fn compound(&mut self, id: NodeId) -> ValuesOp {
        let tree = self.tree;
        let span = tree.span(id);
        let Some(c) = tree.compound(id) else {
            return ValuesOp::new(span, ValuesKind::Literal(String::new()));
        };
        let wild_of = |ix: NodeId| match tree.kind(ix) {
            NodeKind::Indexing(i) if i.indices.is_empty() => tree
                .primary(i.head)
                .filter(|p| p.kind == PrimaryKind::Wildcard)
                .map(|p| p.value.clone()),
            _ => None,
        };
        if c.indexings.iter().any(|ix| wild_of(*ix).is_some()) {
            let pieces = c
                .indexings
                .iter()
                .map(|ix| match wild_of(*ix) {
                    Some(w) => GlobPiece::Wild(w),
                    None => GlobPiece::Values(self.indexing(*ix)),
                })
                .collect();
            return ValuesOp::new(span, ValuesKind::Glob(pieces));
        }
        let mut parts: Vec<ValuesOp> = c.indexings.iter().map(|ix| self.indexing(*ix)).collect();
        if parts.len() == 1 {
            return parts.remove(0);
        }
        ValuesOp::new(span, ValuesKind::Compound(parts))
    }

    fn indexing(&mut self, id: NodeId) -> ValuesOp {
        let tree = self.tree;
        let span = tree.span(id);
        let NodeKind::Indexing(ix) = tree.kind(id) else {
            return ValuesOp::new(span, ValuesKind::Literal(String::new()));
        };
        let base = self.primary(ix.head);
        if ix.indices.is_empty() {
            return base;
        }
        let indices = ix
            .indices
            .iter()
            .map(|a| match tree.kind(*a) {
                NodeKind::Array(arr) => arr.compounds.iter().map(|c| self.compound(*c)).collect(),
                _ => Vec::new(),
            })
            .collect();
        ValuesOp::new(
            span,
            ValuesKind::Index {
                base: Box::new(base),
                indices,
            },
        )
    }

    fn primary(&mut self, id: NodeId) -> ValuesOp {
        let tree = self.tree;
        let span = tree.span(id);
        let Some(p) = tree.primary(id) else {
            return ValuesOp::new(span, ValuesKind::Literal(String::new()));
        };
        let kind = match p.kind {
            PrimaryKind::Bareword | PrimaryKind::SingleQuoted | PrimaryKind::DoubleQuoted | PrimaryKind::Wildcard => {
                ValuesKind::Literal(p.value.clone())
            }
            PrimaryKind::Variable => {
                if p.value.is_empty() {
                    // already reported by the parser
                    ValuesKind::Literal(String::new())
                } else {
                    match self.resolve(&p.value) {
                        Some(var) => ValuesKind::Var { var, splice: p.splice },
                        None => {
                            self.error(span, format!("variable ${} not found", p.value));
                            ValuesKind::Literal(String::new())
                        }
                    }
                }
            }
            PrimaryKind::Tilde => ValuesKind::Tilde,
            PrimaryKind::OutputCapture | PrimaryKind::ExceptionCapture => {
                let chunk = match p.chunk {
                    Some(c) => self.chunk(c),
                    None => Arc::new(ChunkOp {
                        span,
                        pipelines: Vec::new(),
                    }),
                };
                if p.kind == PrimaryKind::OutputCapture {
                    ValuesKind::Capture(chunk)
                } else {
                    ValuesKind::ExceptionCapture(chunk)
                }
            }
            PrimaryKind::List => ValuesKind::List(p.elements.iter().map(|e| self.compound(*e)).collect()),
            PrimaryKind::Map => {
                let mut pairs = Vec::new();
                for pair_id in &p.pairs {
                    let Some(pair) = tree.map_pair(*pair_id) else { continue };
                    match (pair.key, pair.value) {
                        (Some(k), Some(v)) => pairs.push((self.compound(k), self.compound(v))),
                        _ => self.error(tree.span(*pair_id), "map entry needs a key and a value"),
                    }
                }
                ValuesKind::Map(pairs)
            }
            PrimaryKind::Lambda => ValuesKind::Lambda(self.lambda(id)),
        };
        ValuesOp::new(span, kind)
    }

    fn lambda(&mut self, id: NodeId) -> Arc<LambdaOp> {
        let tree = self.tree;
        let span = tree.span(id);
        let Some(p) = tree.primary(id) else {
            return Arc::new(LambdaOp {
                span,
                params: Vec::new(),
                rest: None,
                opts: Vec::new(),
                captures: Vec::new(),
                locals: 0,
                body: Arc::new(ChunkOp {
                    span,
                    pipelines: Vec::new(),
                }),
            });
        };

        // option defaults are evaluated where the lambda is created
        let mut opts = Vec::new();
        for pair_id in &p.pairs {
            let Some(pair) = tree.map_pair(*pair_id) else { continue };
            let pspan = tree.span(*pair_id);
            let Some(name) = pair.key.and_then(|k| tree.bareword(k)) else {
                self.error(pspan, "option name must be a bareword");
                continue;
            };
            let Some(value) = pair.value else {
                self.error(pspan, "option needs a default value");
                continue;
            };
            opts.push((name.to_string(), self.compound(value)));
        }

        self.lambdas.push(LambdaScope::default());
        let mut params = Vec::new();
        let mut rest = None;
        for elem in &p.elements {
            let espan = tree.span(*elem);
            let Some(word) = tree.bareword(*elem) else {
                self.error(espan, "parameter name must be a bareword");
                continue;
            };
            let (name, is_rest) = split_rest(word);
            if is_rest {
                if rest.is_some() {
                    self.error(espan, "at most one rest parameter is allowed");
                }
                rest = Some(params.len());
            }
            params.push(name.to_string());
        }
        if let Some(scope) = self.lambdas.last_mut() {
            for name in &params {
                scope.locals.add(name.as_str());
            }
            for (name, _) in &opts {
                scope.locals.add(name.as_str());
            }
        }
        let hoisted: Vec<String> = self.scopes.hoisted(id).map(|d| d.name.clone()).collect();
        for name in hoisted {
            self.declare(&name);
        }

        let body = match p.chunk {
            Some(c) => self.chunk(c),
            None => Arc::new(ChunkOp {
                span,
                pipelines: Vec::new(),
            }),
        };
        let scope = self.lambdas.pop().unwrap_or_default();
        Arc::new(LambdaOp {
            span,
            params,
            rest,
            opts,
            captures: scope.captures,
            locals: scope.locals.len(),
            body,
        })
    }
}
