//! Reading pattern text into segments.

use std::fmt;

use tern_types::Lexer;

/// Kind of a wildcard segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildKind {
    /// `?`: one rune within a path component.
    Question,
    /// `*`: any runes within a path component.
    Star,
    /// `**` (or longer runs of `*`): any runes, across components.
    StarStar,
}

/// One piece of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// One or more consecutive `/`.
    Slash,
    Wild(WildKind),
}

/// A parsed wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern {
    pub segments: Vec<Segment>,
}

impl Pattern {
    /// Read a pattern. Every string is a valid pattern; a trailing lone
    /// `\` is dropped.
    pub fn parse(text: &str) -> Self {
        let mut lx = Lexer::new(text);
        let mut segments = Vec::new();

        while let Some(r) = lx.next() {
            match r {
                '?' => segments.push(Segment::Wild(WildKind::Question)),
                '*' => {
                    let mut n = 1;
                    while lx.next() == Some('*') {
                        n += 1;
                    }
                    lx.backup();
                    let kind = if n == 1 { WildKind::Star } else { WildKind::StarStar };
                    segments.push(Segment::Wild(kind));
                }
                '/' => {
                    while lx.next() == Some('/') {}
                    lx.backup();
                    segments.push(Segment::Slash);
                }
                first => {
                    let mut literal = String::new();
                    let mut r = Some(first);
                    loop {
                        match r {
                            None | Some('?' | '*' | '/') => break,
                            Some('\\') => match lx.next() {
                                Some(escaped) => literal.push(escaped),
                                None => break,
                            },
                            Some(c) => literal.push(c),
                        }
                        r = lx.next();
                    }
                    lx.backup();
                    segments.push(Segment::Literal(literal));
                }
            }
        }

        Pattern { segments }
    }

    /// True if any segment is a wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Wild(_)))
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self.segments.first(), Some(Segment::Slash))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => f.write_str(&escape(s))?,
                Segment::Slash => f.write_str("/")?,
                Segment::Wild(WildKind::Question) => f.write_str("?")?,
                Segment::Wild(WildKind::Star) => f.write_str("*")?,
                Segment::Wild(WildKind::StarStar) => f.write_str("**")?,
            }
        }
        Ok(())
    }
}

/// Escape text so that it reads back as a single literal.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '?' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
