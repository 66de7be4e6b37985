//! Static resolution: which names each scope declares, and from where.
//!
//! Scopes are the top-level chunk and every lambda. Declarations come from
//! the binding forms and lambda signatures:
//!
//! | form                 | name     | visible from            |
//! |----------------------|----------|-------------------------|
//! | `var a @b = ...`     | `a`, `b` | end of the form         |
//! | `fn f {...}`         | `f~`     | start of the scope      |
//! | `for x $list {...}`  | `x`      | end of the iterable     |
//! | `try ... catch e`    | `e`      | end of the name         |
//! | `use m`              | `m:`     | end of the form         |
//! | `{|a @b &o=x| ...}`  | `a b o`  | start of the lambda     |
//!
//! Lowering consults this table instead of rediscovering names, so the
//! forward-reference and shadowing rules live in one place.

use std::collections::HashMap;

use crate::parse::{NodeId, NodeKind, PrimaryKind, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Fn,
    Param,
    Opt,
    For,
    Catch,
    Use,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub name: String,
    pub kind: DeclKind,
    /// Node spelling the name.
    pub node: NodeId,
    /// Byte offset from which the name can be referenced.
    pub visible_from: usize,
    /// Written `@name`.
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub struct StaticScope {
    /// The root chunk or a lambda primary.
    pub node: NodeId,
    pub parent: Option<usize>,
    pub decls: Vec<Decl>,
}

/// Result of the resolution pass.
#[derive(Debug, Clone, Default)]
pub struct StaticScopes {
    scopes: Vec<StaticScope>,
    by_node: HashMap<NodeId, usize>,
    by_form: HashMap<NodeId, Vec<(usize, usize)>>,
}

impl StaticScopes {
    pub fn scopes(&self) -> &[StaticScope] {
        &self.scopes
    }

    /// Scope opened by `node` (the root chunk or a lambda).
    pub fn scope_of(&self, node: NodeId) -> Option<&StaticScope> {
        self.by_node.get(&node).map(|i| &self.scopes[*i])
    }

    /// `fn` declarations of the scope opened by `node`.
    pub fn hoisted(&self, node: NodeId) -> impl Iterator<Item = &Decl> {
        self.scope_of(node)
            .into_iter()
            .flat_map(|s| s.decls.iter())
            .filter(|d| d.kind == DeclKind::Fn)
    }

    /// Declarations introduced by one binding form.
    pub fn decls_by_form(&self, form: NodeId) -> Vec<&Decl> {
        self.by_form
            .get(&form)
            .map(|v| v.iter().map(|(s, d)| &self.scopes[*s].decls[*d]).collect())
            .unwrap_or_default()
    }

    /// Names declared in `node`'s enclosing scopes and visible at its start,
    /// innermost first, without duplicates. Globals from earlier evaluations
    /// and builtins are not included.
    pub fn visible_at(&self, tree: &Tree, node: NodeId) -> Vec<String> {
        let pos = tree.span(node).start;
        let mut out: Vec<String> = Vec::new();
        let mut cur = Some(node);
        while let Some(n) = cur {
            if let Some(scope) = self.scope_of(n) {
                for decl in scope.decls.iter().rev() {
                    if decl.visible_from <= pos && !out.contains(&decl.name) {
                        out.push(decl.name.clone());
                    }
                }
            }
            cur = tree.parent(n);
        }
        out
    }
}

/// Run the resolution pass over a parsed tree.
pub fn resolve(tree: &Tree) -> StaticScopes {
    let mut r = Resolver {
        tree,
        out: StaticScopes::default(),
    };
    let root = tree.root();
    let scope = r.open_scope(root, None);
    r.visit(root, scope);
    r.out
}

struct Resolver<'a> {
    tree: &'a Tree,
    out: StaticScopes,
}

/// Strip a leading `@` from a declared name.
pub(crate) fn split_rest(word: &str) -> (&str, bool) {
    match word.strip_prefix('@') {
        Some(name) => (name, true),
        None => (word, false),
    }
}

impl<'a> Resolver<'a> {
    fn open_scope(&mut self, node: NodeId, parent: Option<usize>) -> usize {
        let idx = self.out.scopes.len();
        self.out.scopes.push(StaticScope {
            node,
            parent,
            decls: Vec::new(),
        });
        self.out.by_node.insert(node, idx);
        idx
    }

    fn declare(&mut self, scope: usize, form: Option<NodeId>, decl: Decl) {
        let decls = &mut self.out.scopes[scope].decls;
        decls.push(decl);
        if let Some(form) = form {
            self.out.by_form.entry(form).or_default().push((scope, decls.len() - 1));
        }
    }

    fn visit(&mut self, node: NodeId, scope: usize) {
        let tree = self.tree;
        match tree.kind(node) {
            NodeKind::Form(_) => self.form(node, scope),
            NodeKind::Primary(p) if p.kind == PrimaryKind::Lambda => {
                let inner = self.open_scope(node, Some(scope));
                self.signature(node, inner);
                for child in tree.children(node) {
                    self.visit(*child, inner);
                }
                return;
            }
            _ => {}
        }
        for child in tree.children(node) {
            self.visit(*child, scope);
        }
    }

    fn signature(&mut self, lambda: NodeId, scope: usize) {
        let tree = self.tree;
        let Some(p) = tree.primary(lambda) else { return };
        let start = tree.span(lambda).start;
        for elem in &p.elements {
            if let Some(word) = tree.bareword(*elem) {
                let (name, rest) = split_rest(word);
                self.declare(
                    scope,
                    None,
                    Decl {
                        name: name.to_string(),
                        kind: DeclKind::Param,
                        node: *elem,
                        visible_from: start,
                        rest,
                    },
                );
            }
        }
        for pair in &p.pairs {
            let Some(key) = tree.map_pair(*pair).and_then(|mp| mp.key) else {
                continue;
            };
            if let Some(name) = tree.bareword(key) {
                self.declare(
                    scope,
                    None,
                    Decl {
                        name: name.to_string(),
                        kind: DeclKind::Opt,
                        node: key,
                        visible_from: start,
                        rest: false,
                    },
                );
            }
        }
    }

    fn form(&mut self, id: NodeId, scope: usize) {
        let tree = self.tree;
        let Some(form) = tree.form(id) else { return };
        let Some(head) = form.head.and_then(|h| tree.bareword(h)) else {
            return;
        };
        let form_end = tree.span(id).end;
        let decl = |name: &str, kind, node, visible_from, rest| Decl {
            name: name.to_string(),
            kind,
            node,
            visible_from,
            rest,
        };
        match head {
            "var" => {
                for arg in &form.args {
                    let Some(word) = tree.bareword(*arg) else { continue };
                    if word == "=" {
                        break;
                    }
                    let (name, rest) = split_rest(word);
                    self.declare(scope, Some(id), decl(name, DeclKind::Var, *arg, form_end, rest));
                }
            }
            "fn" => {
                if let Some(name) = form.args.first().and_then(|a| tree.bareword(*a)) {
                    let scope_start = tree.span(self.out.scopes[scope].node).start;
                    let name = format!("{name}~");
                    self.declare(scope, Some(id), decl(&name, DeclKind::Fn, form.args[0], scope_start, false));
                }
            }
            "for" => {
                if let (Some(name), Some(iterable)) = (form.args.first().and_then(|a| tree.bareword(*a)), form.args.get(1)) {
                    let from = tree.span(*iterable).end;
                    self.declare(scope, Some(id), decl(name, DeclKind::For, form.args[0], from, false));
                }
            }
            "try" => {
                let mut args = form.args.iter().peekable();
                while let Some(arg) = args.next() {
                    if tree.bareword(*arg) != Some("catch") {
                        continue;
                    }
                    if let Some(name_arg) = args.peek() {
                        if let Some(name) = tree.bareword(**name_arg) {
                            let from = tree.span(**name_arg).end;
                            self.declare(scope, Some(id), decl(name, DeclKind::Catch, **name_arg, from, false));
                        }
                    }
                    break;
                }
            }
            "use" => {
                if let Some(name) = form.args.first().and_then(|a| tree.bareword(*a)) {
                    let name = format!("{}:", module_alias(name));
                    self.declare(scope, Some(id), decl(&name, DeclKind::Use, form.args[0], form_end, false));
                }
            }
            _ => {}
        }
    }
}

/// Name a module is bound under: the last path component.
pub(crate) fn module_alias(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use tern_types::Source;

    fn scopes_of(code: &str) -> (Tree, StaticScopes) {
        let parsed = parse(&Source::new("[test]", code));
        assert!(parsed.is_ok(), "{:?}", parsed.errors);
        let scopes = resolve(&parsed.tree);
        (parsed.tree, scopes)
    }

    fn names(scope: &StaticScope) -> Vec<&str> {
        scope.decls.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn declarations_per_scope() {
        let (_, scopes) = scopes_of("var a @b = 1 2 3\nfn f {|x &y=1| var z }\nuse str");
        assert_eq!(scopes.scopes().len(), 2);
        assert_eq!(names(&scopes.scopes()[0]), vec!["a", "b", "f~", "str:"]);
        assert_eq!(names(&scopes.scopes()[1]), vec!["x", "y", "z"]);
        assert!(scopes.scopes()[0].decls[1].rest);
    }

    #[test]
    fn fn_is_hoisted() {
        let (tree, scopes) = scopes_of("g\nfn g { }");
        let first_form = tree.ids().find(|id| tree.form(*id).is_some()).unwrap();
        assert_eq!(scopes.visible_at(&tree, first_form), vec!["g~"]);
        assert_eq!(scopes.hoisted(tree.root()).count(), 1);
    }

    #[test]
    fn var_visible_after_form() {
        let (tree, scopes) = scopes_of("var x = $x; put $x");
        let reads: Vec<NodeId> = tree
            .ids()
            .filter(|id| tree.primary(*id).is_some_and(|p| p.kind == PrimaryKind::Variable))
            .collect();
        assert_eq!(reads.len(), 2);
        assert!(scopes.visible_at(&tree, reads[0]).is_empty());
        assert_eq!(scopes.visible_at(&tree, reads[1]), vec!["x"]);
    }

    #[test]
    fn inner_scope_sees_outer() {
        let (tree, scopes) = scopes_of("var a\n{|b| put $a $b }");
        let read_b = tree
            .ids()
            .filter(|id| tree.primary(*id).is_some_and(|p| p.kind == PrimaryKind::Variable))
            .last()
            .unwrap();
        assert_eq!(scopes.visible_at(&tree, read_b), vec!["b", "a"]);
    }

    #[test]
    fn binding_forms_record_decls() {
        let (tree, scopes) = scopes_of("for i [1 2] { }; try { } catch e { }");
        let forms: Vec<NodeId> = tree.ids().filter(|id| tree.form(*id).is_some()).collect();
        let for_decls = scopes.decls_by_form(forms[0]);
        assert_eq!(for_decls.len(), 1);
        assert_eq!(for_decls[0].kind, DeclKind::For);
        let try_form = forms.iter().find(|f| tree.text(**f).starts_with("try")).unwrap();
        assert_eq!(scopes.decls_by_form(*try_form)[0].name, "e");
    }
}
