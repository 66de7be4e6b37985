//! Rune-by-rune reader with one-rune pushback.
//!
//! ```text
//!   src:  p u t ␠ x
//!         ^ pos
//!   next()   → Some('p'), pos += len_utf8('p')
//!   backup() → pos -= len_utf8(last rune)
//!   next() at end → None, over_eof += 1
//!   backup() with over_eof > 0 → over_eof -= 1, pos unchanged
//! ```
//!
//! There is no token buffer and no lookahead beyond what `next`/`backup`
//! give you. Callers peek by reading and backing up. Repeated `backup`
//! calls walk back one rune each, so a caller that read `n` runes may back
//! up `n` times.

/// Reader over a UTF-8 source string.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    over_eof: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            over_eof: 0,
        }
    }

    /// Read the next rune, or `None` once the input is exhausted.
    ///
    /// Reading past the end is counted so that the matching `backup` calls
    /// leave the byte position untouched.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<char> {
        match self.src[self.pos..].chars().next() {
            Some(r) => {
                self.pos += r.len_utf8();
                Some(r)
            }
            None => {
                self.over_eof += 1;
                None
            }
        }
    }

    /// Undo one prior `next`.
    pub fn backup(&mut self) {
        if self.over_eof > 0 {
            self.over_eof -= 1;
            return;
        }
        if let Some(r) = self.src[..self.pos].chars().next_back() {
            self.pos -= r.len_utf8();
        }
    }

    /// Byte offset of the next rune to be read.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn src(&self) -> &'a str {
        self.src
    }

    /// True when the position is at the end of input.
    pub fn at_end(&self) -> bool {
        self.pos == self.src.len()
    }

    /// Rewind to the start of the source.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.over_eof = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn reads_runes_by_width() {
        let mut lx = Lexer::new("aé€😀");
        assert_eq!(lx.next(), Some('a'));
        assert_eq!(lx.pos(), 1);
        assert_eq!(lx.next(), Some('é'));
        assert_eq!(lx.pos(), 3);
        assert_eq!(lx.next(), Some('€'));
        assert_eq!(lx.pos(), 6);
        assert_eq!(lx.next(), Some('😀'));
        assert_eq!(lx.pos(), 10);
        assert_eq!(lx.next(), None);
        assert!(lx.at_end());
    }

    #[test]
    fn backup_across_end_of_input() {
        let mut lx = Lexer::new("ab");
        lx.next();
        lx.next();
        assert_eq!(lx.next(), None);
        assert_eq!(lx.next(), None);
        lx.backup();
        lx.backup();
        assert_eq!(lx.pos(), 2);
        lx.backup();
        assert_eq!(lx.pos(), 1);
        assert_eq!(lx.next(), Some('b'));
    }

    #[test]
    fn backup_on_fresh_lexer_is_noop() {
        let mut lx = Lexer::new("x");
        lx.backup();
        assert_eq!(lx.pos(), 0);
        assert_eq!(lx.next(), Some('x'));
    }

    #[test]
    fn reset_rewinds() {
        let mut lx = Lexer::new("xy");
        lx.next();
        lx.next();
        lx.next();
        lx.reset();
        assert_eq!(lx.pos(), 0);
        assert_eq!(lx.next(), Some('x'));
    }

    /// After any number of reads, one backup restores the position held
    /// before the last read, and re-reading yields the same rune.
    #[rstest]
    #[case("")]
    #[case("put x")]
    #[case("héllo wörld")]
    #[case("日本語")]
    #[case("a😀b")]
    fn backup_inverts_next(#[case] src: &str) {
        let total = src.chars().count() + 3;
        for reads in 1..=total {
            let mut lx = Lexer::new(src);
            let mut before = 0;
            let mut last = None;
            for _ in 0..reads {
                before = lx.pos();
                last = lx.next();
            }
            lx.backup();
            assert_eq!(lx.pos(), before, "src={src:?} reads={reads}");
            assert_eq!(lx.next(), last, "src={src:?} reads={reads}");
        }
    }
}
