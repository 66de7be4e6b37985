//! Runtime values.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tern_types::Source;

use super::exception::{Cause, Exception};
use super::ns::{Cell, Ns};
use crate::builtins::Builtin;
use crate::compile::LambdaOp;
use crate::num::Num;

/// A value flowing through variables and value ports.
///
/// Aggregates are immutable and shared; "modifying" a list or map builds a
/// new one.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Str(String),
    Num(Num),
    List(Arc<Vec<Value>>),
    Map(Arc<BTreeMap<String, Value>>),
    Closure(Arc<Closure>),
    Builtin(Arc<dyn Builtin>),
    Ns(Arc<Ns>),
    /// `None` is `$ok`, the value of a successful `?(...)`.
    Exception(Option<Arc<Exception>>),
}

/// A lambda together with the cells it closed over.
pub struct Closure {
    pub(crate) op: Arc<LambdaOp>,
    pub(crate) captured: Arc<[Cell]>,
    /// Option defaults, evaluated when the closure was created.
    pub(crate) opt_defaults: Vec<Value>,
    pub(crate) source: Source,
    /// Closures defined with `fn` stop `return`.
    pub(crate) catch_return: bool,
}

impl Closure {
    pub fn params(&self) -> &[String] {
        &self.op.params
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Arc::new(entries))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Num(_) => "number",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Closure(_) | Value::Builtin(_) => "fn",
            Value::Ns(_) => "ns",
            Value::Exception(_) => "exception",
        }
    }

    /// `$false`, `$nil` and exceptions are false; everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil | Value::Bool(false) => false,
            Value::Exception(e) => e.is_none(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// String form used by `echo`, concatenation and external arguments.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Num(n) => n.to_string(),
            _ => self.repr(),
        }
    }

    /// Source-like form used by `put` at the terminal and `repr`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Value::Nil => out.push_str("$nil"),
            Value::Bool(true) => out.push_str("$true"),
            Value::Bool(false) => out.push_str("$false"),
            Value::Str(s) => out.push_str(&quote(s)),
            Value::Num(n) => {
                out.push_str("(num ");
                out.push_str(&n.to_string());
                out.push(')');
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.write_repr(out);
                }
                out.push(']');
            }
            Value::Map(entries) => {
                if entries.is_empty() {
                    out.push_str("[&]");
                    return;
                }
                out.push('[');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push('&');
                    out.push_str(&quote(k));
                    out.push('=');
                    v.write_repr(out);
                }
                out.push(']');
            }
            Value::Closure(c) => out.push_str(&format!("<closure {:p}>", Arc::as_ptr(c))),
            Value::Builtin(b) => out.push_str(&format!("<builtin {}>", b.name())),
            Value::Ns(ns) => out.push_str(&format!("<ns {}>", ns.name())),
            Value::Exception(None) => out.push_str("$ok"),
            Value::Exception(Some(e)) => {
                out.push_str("[^exception &reason=");
                out.push_str(&quote(&e.cause.to_string()));
                out.push(']');
            }
        }
    }

    /// Read as a number; strings are parsed.
    pub fn as_num(&self) -> Result<Num, Cause> {
        match self {
            Value::Num(n) => Ok(n.clone()),
            Value::Str(s) => Num::parse(s).map_err(|_| Cause::bad_value("argument", "number", self.repr())),
            other => Err(Cause::wrong_type("number", other.kind())),
        }
    }

    /// Read as an `i64`, as used for counts and positions.
    pub fn as_int(&self, what: &str) -> Result<i64, Cause> {
        self.as_num()?
            .to_i64()
            .ok_or_else(|| Cause::bad_value(what, "integer", self.repr()))
    }

    /// Concatenate two values written back to back.
    pub fn concat(&self, other: &Value) -> Result<Value, Cause> {
        match (self, other) {
            (Value::Str(_) | Value::Num(_), Value::Str(_) | Value::Num(_)) => {
                Ok(Value::Str(self.to_str() + &other.to_str()))
            }
            (Value::Str(_) | Value::Num(_), b) => Err(Cause::wrong_type("string", b.kind())),
            (a, _) => Err(Cause::wrong_type("string", a.kind())),
        }
    }

    /// Elements visited by `for`.
    pub fn iterate(&self) -> Result<Vec<Value>, Cause> {
        match self {
            Value::List(items) => Ok(items.as_ref().clone()),
            other => Err(Cause::wrong_type("iterable", other.kind())),
        }
    }

    /// `value[idx]`.
    pub fn index(&self, idx: &Value) -> Result<Value, Cause> {
        match self {
            Value::List(items) => match parse_index(&idx.to_str(), items.len())? {
                Index::One(i) => Ok(items[i].clone()),
                Index::Slice(lo, hi) => Ok(Value::list(items[lo..hi].to_vec())),
            },
            Value::Str(s) => {
                let (lo, hi) = match parse_index(&idx.to_str(), s.len())? {
                    Index::One(i) => {
                        let width = s.get(i..).and_then(|rest| rest.chars().next()).map(char::len_utf8);
                        match width {
                            Some(w) => (i, i + w),
                            None => return Err(Cause::bad_value("index", "codepoint boundary", idx.to_str())),
                        }
                    }
                    Index::Slice(lo, hi) => (lo, hi),
                };
                s.get(lo..hi)
                    .map(Value::str)
                    .ok_or_else(|| Cause::bad_value("index", "codepoint boundary", idx.to_str()))
            }
            Value::Map(entries) => entries
                .get(&idx.to_str())
                .cloned()
                .ok_or_else(|| Cause::Fail(format!("no such key: {}", idx.repr()))),
            other => Err(Cause::wrong_type("indexable value", other.kind())),
        }
    }

    /// A copy with `self[idx]` replaced by `v`.
    pub fn assoc(&self, idx: &Value, v: Value) -> Result<Value, Cause> {
        match self {
            Value::List(items) => match parse_index(&idx.to_str(), items.len())? {
                Index::One(i) => {
                    let mut items = items.as_ref().clone();
                    items[i] = v;
                    Ok(Value::list(items))
                }
                Index::Slice(..) => Err(Cause::bad_value("index", "single index", idx.to_str())),
            },
            Value::Map(entries) => {
                let mut entries = entries.as_ref().clone();
                entries.insert(idx.to_str(), v);
                Ok(Value::map(entries))
            }
            other => Err(Cause::wrong_type("list or map", other.kind())),
        }
    }

    /// A copy with `self[idx]` removed.
    pub fn dissoc(&self, idx: &Value) -> Result<Value, Cause> {
        match self {
            Value::List(items) => match parse_index(&idx.to_str(), items.len())? {
                Index::One(i) => {
                    let mut items = items.as_ref().clone();
                    items.remove(i);
                    Ok(Value::list(items))
                }
                Index::Slice(lo, hi) => {
                    let mut items = items.as_ref().clone();
                    items.drain(lo..hi);
                    Ok(Value::list(items))
                }
            },
            Value::Map(entries) => {
                let mut entries = entries.as_ref().clone();
                entries.remove(&idx.to_str());
                Ok(Value::map(entries))
            }
            other => Err(Cause::wrong_type("list or map", other.kind())),
        }
    }
}

enum Index {
    One(usize),
    Slice(usize, usize),
}

/// Parse `i`, `i..j`, `i..=j`, `i..`, `..j` or `..` against a length.
/// Negative positions count from the end.
fn parse_index(text: &str, len: usize) -> Result<Index, Cause> {
    let bad = || Cause::bad_value("index", "integer or range", text.to_string());
    let out_of_range = || Cause::bad_value("index", format!("from -{len} to {}", len.saturating_sub(1)), text.to_string());
    let pos = |s: &str, allow_end: bool| -> Result<usize, Cause> {
        let i: i64 = s.parse().map_err(|_| bad())?;
        let len = len as i64;
        let i = if i < 0 { i + len } else { i };
        let max = if allow_end { len } else { len - 1 };
        if i < 0 || i > max {
            return Err(out_of_range());
        }
        Ok(i as usize)
    };

    let Some((lo, hi)) = text.split_once("..") else {
        return pos(text, false).map(Index::One);
    };
    let lo = if lo.is_empty() { 0 } else { pos(lo, true)? };
    let hi = match hi.strip_prefix('=') {
        Some(h) => pos(h, false)? + 1,
        None if hi.is_empty() => len,
        None => pos(hi, true)?,
    };
    if lo > hi {
        return Err(out_of_range());
    }
    Ok(Index::Slice(lo, hi))
}

fn is_bare(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|r| {
            r.is_ascii_alphanumeric()
                || matches!(r, '!' | '%' | '+' | ',' | '-' | '.' | '/' | ':' | '@' | '_' | '=')
                || (!r.is_ascii() && !r.is_whitespace() && !r.is_control())
        })
}

/// Quote a string so that it reads back as itself.
pub fn quote(s: &str) -> String {
    if is_bare(s) {
        return s.to_string();
    }
    if s.chars().any(|r| r.is_control()) {
        let mut out = String::from("\"");
        for r in s.chars() {
            match r {
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                '\x1b' => out.push_str("\\e"),
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                r if r.is_control() => out.push_str(&format!("\\u{{{:x}}}", r as u32)),
                r => out.push(r),
            }
        }
        out.push('"');
        return out;
    }
    format!("'{}'", s.replace('\'', "''"))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Arc::ptr_eq(a, b),
            (Value::Ns(a), Value::Ns(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(None), Value::Exception(None)) => true,
            (Value::Exception(Some(a)), Value::Exception(Some(b))) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Num> for Value {
    fn from(n: Num) -> Self {
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(Num::Int(n))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn abc() -> Value {
        Value::list(vec!["a".into(), "b".into(), "c".into()])
    }

    #[rstest]
    #[case("0", "a")]
    #[case("-1", "c")]
    #[case("1..", "[b c]")]
    #[case("..2", "[a b]")]
    #[case("0..=1", "[a b]")]
    #[case("..", "[a b c]")]
    #[case("3..", "[]")]
    fn list_indexing(#[case] idx: &str, #[case] want: &str) {
        assert_eq!(abc().index(&idx.into()).unwrap().repr(), want);
    }

    #[rstest]
    #[case("3")]
    #[case("-4")]
    #[case("2..1")]
    #[case("x")]
    fn bad_list_index(#[case] idx: &str) {
        assert!(abc().index(&idx.into()).is_err());
    }

    #[test]
    fn string_indexing_respects_codepoints() {
        let s = Value::str("aé");
        assert_eq!(s.index(&"1".into()).unwrap(), Value::str("é"));
        assert!(s.index(&"2".into()).is_err());
        assert_eq!(s.index(&"0..1".into()).unwrap(), Value::str("a"));
    }

    #[test]
    fn map_assoc_and_index() {
        let m = Value::map(BTreeMap::new()).assoc(&"k".into(), "v".into()).unwrap();
        assert_eq!(m.index(&"k".into()).unwrap(), Value::str("v"));
        assert_eq!(m.repr(), "[&k=v]");
        assert_eq!(m.dissoc(&"k".into()).unwrap().repr(), "[&]");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Exception(None).truthy());
        assert!(!Value::Exception(Some(Arc::new(Exception::fail("x")))).truthy());
        assert!(Value::str("").truthy());
        assert!(Value::from(0).truthy());
    }

    #[rstest]
    #[case("abc", "abc")]
    #[case("a b", "'a b'")]
    #[case("it's", "'it''s'")]
    #[case("", "''")]
    #[case("a\nb", "\"a\\nb\"")]
    fn quoting(#[case] s: &str, #[case] want: &str) {
        assert_eq!(quote(s), want);
    }

    #[test]
    fn concat_rejects_lists() {
        assert_eq!(Value::str("a").concat(&Value::from(1)).unwrap(), Value::str("a1"));
        assert!(Value::str("a").concat(&abc()).is_err());
    }
}
