//! Sources, spans and ranged diagnostics.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// A named piece of code. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    name: Arc<str>,
    code: Arc<str>,
}

impl Source {
    pub fn new(name: impl Into<Arc<str>>, code: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    /// A source with the conventional name for interactive input.
    pub fn interactive(code: impl Into<Arc<str>>) -> Self {
        Self::new("[interactive]", code)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Source text covered by `span`, clipped to the code.
    pub fn slice(&self, span: Span) -> &str {
        let end = span.end.min(self.code.len());
        let start = span.start.min(end);
        &self.code[start..end]
    }
}

/// Half-open byte range `[start, end)` into a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert the start offset to 1-indexed (line, column).
    pub fn to_line_col(&self, code: &str) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for (i, ch) in code.char_indices() {
            if i >= self.start {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Which phase produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Parse,
    Compile,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Parse => write!(f, "parse error"),
            DiagnosticKind::Compile => write!(f, "compilation error"),
        }
    }
}

/// A ranged error record.
///
/// Offsets are 0-based bytes into the UTF-8 code. `partial` is set when the
/// range starts exactly at the end of input, meaning more input might fix
/// the problem; line-oriented callers use it to ask for another line
/// instead of reporting failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub source_name: String,
    pub span: Span,
    pub partial: bool,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, source: &Source, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            source_name: source.name().to_string(),
            span,
            partial: span.start == source.code().len(),
        }
    }

    pub fn parse(message: impl Into<String>, source: &Source, span: Span) -> Self {
        Self::new(DiagnosticKind::Parse, message, source, span)
    }

    pub fn compile(message: impl Into<String>, source: &Source, span: Span) -> Self {
        Self::new(DiagnosticKind::Compile, message, source, span)
    }

    /// Render as `name:line:col: kind: message` followed by the offending line.
    pub fn format(&self, code: &str) -> String {
        let (line, col) = self.span.to_line_col(code);
        let mut out = format!("{}:{}:{}: {}: {}", self.source_name, line, col, self.kind, self.message);
        if let Some(text) = line_at_offset(code, self.span.start) {
            out.push_str("\n  | ");
            out.push_str(text);
        }
        out
    }
}

/// True if every diagnostic in the list is partial (and there is at least one).
pub fn all_partial(diags: &[Diagnostic]) -> bool {
    !diags.is_empty() && diags.iter().all(|d| d.partial)
}

fn line_at_offset(code: &str, offset: usize) -> Option<&str> {
    if offset >= code.len() {
        return None;
    }
    let start = code[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = code[offset..].find('\n').map_or(code.len(), |i| offset + i);
    Some(&code[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_line_col() {
        let code = "put a\nput b\nput c";
        assert_eq!(Span::new(0, 3).to_line_col(code), (1, 1));
        assert_eq!(Span::new(10, 11).to_line_col(code), (2, 5));
        assert_eq!(Span::new(12, 15).to_line_col(code), (3, 1));
    }

    #[test]
    fn partial_only_at_end_of_input() {
        let src = Source::new("t", "put (");
        let at_end = Diagnostic::parse("should be ')'", &src, Span::new(5, 5));
        let inside = Diagnostic::parse("unexpected rune", &src, Span::new(4, 5));
        assert!(at_end.partial);
        assert!(!inside.partial);
        assert!(all_partial(&[at_end.clone()]));
        assert!(!all_partial(&[at_end, inside]));
        assert!(!all_partial(&[]));
    }

    #[test]
    fn format_includes_location_and_line() {
        let src = Source::new("rc", "put x\nput $y");
        let d = Diagnostic::compile("variable $y not found", &src, Span::new(10, 12));
        assert_eq!(
            d.format(src.code()),
            "rc:2:5: compilation error: variable $y not found\n  | put $y"
        );
    }

    #[test]
    fn serializes_for_editors() {
        let src = Source::new("buf", "x)");
        let d = Diagnostic::parse("unexpected rune ')'", &src, Span::new(1, 2));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "parse");
        assert_eq!(json["span"]["start"], 1);
        assert_eq!(json["partial"], false);
        assert_eq!(json["source_name"], "buf");
    }

    #[test]
    fn slice_clips() {
        let src = Source::new("t", "abc");
        assert_eq!(src.slice(Span::new(1, 9)), "bc");
        assert_eq!(src.slice(Span::new(5, 9)), "");
    }
}
