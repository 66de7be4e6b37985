//! Whole-path matching against pattern segments.

use std::cell::Cell;

use crate::parse::{Pattern, Segment, WildKind};

/// Bound on recursive match attempts. Protects against patterns like
/// `*a*a*a*…` that backtrack combinatorially.
const MAX_MATCH_CALLS: usize = 100_000;

/// Match `path` (components separated by `/`) against the whole pattern.
pub fn matches(pattern: &Pattern, path: &str) -> bool {
    let calls = Cell::new(0usize);
    match_from(&pattern.segments, path, 0, &calls)
}

fn at_component_start(path: &str, pos: usize) -> bool {
    pos == 0 || path.as_bytes()[pos - 1] == b'/'
}

fn match_from(segs: &[Segment], path: &str, pos: usize, calls: &Cell<usize>) -> bool {
    calls.set(calls.get() + 1);
    if calls.get() > MAX_MATCH_CALLS {
        return false;
    }

    let Some((seg, rest)) = segs.split_first() else {
        return pos == path.len();
    };
    let tail = &path[pos..];

    match seg {
        Segment::Literal(lit) => tail.starts_with(lit.as_str()) && match_from(rest, path, pos + lit.len(), calls),
        Segment::Slash => tail.starts_with('/') && match_from(rest, path, pos + 1, calls),
        Segment::Wild(WildKind::Question) => match tail.chars().next() {
            Some('/') | None => false,
            Some('.') if at_component_start(path, pos) => false,
            Some(c) => match_from(rest, path, pos + c.len_utf8(), calls),
        },
        Segment::Wild(kind) => {
            let crosses = *kind == WildKind::StarStar;
            let mut end = pos;
            loop {
                if match_from(rest, path, end, calls) {
                    return true;
                }
                let Some(c) = path[end..].chars().next() else {
                    return false;
                };
                if c == '/' && !crosses {
                    return false;
                }
                if c == '.' && at_component_start(path, end) {
                    return false;
                }
                end += c.len_utf8();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*.rs", "main.rs", true)]
    #[case("*.rs", "src/main.rs", false)]
    #[case("*/*.rs", "src/main.rs", true)]
    #[case("**.rs", "src/a/b/main.rs", true)]
    #[case("**/*.rs", "src/main.rs", true)]
    #[case("a?c", "abc", true)]
    #[case("a?c", "a/c", false)]
    #[case("*", ".hidden", false)]
    #[case(".*", ".hidden", true)]
    #[case("**", "a/.git/x", false)]
    #[case("src/**", "src/x/y", true)]
    #[case("x", "x", true)]
    #[case("x", "xy", false)]
    #[case("日*", "日本語", true)]
    fn matching(#[case] pattern: &str, #[case] path: &str, #[case] want: bool) {
        assert_eq!(matches(&Pattern::parse(pattern), path), want, "{pattern} vs {path}");
    }

    #[test]
    fn pathological_pattern_terminates() {
        let pattern = Pattern::parse(&"*a".repeat(30));
        let path = "a".repeat(60) + "b";
        assert!(!matches(&pattern, &path));
    }
}
