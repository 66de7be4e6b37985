//! Parser tests: tree shape through s-expressions, error recovery, and
//! range bookkeeping.

use insta::assert_snapshot;
use rstest::rstest;
use tern_kernel::parse::{parse, NodeId, Parsed, Tree};
use tern_types::{all_partial, Source};

fn parse_str(code: &str) -> Parsed {
    parse(&Source::new("[test]", code))
}

fn sexpr(code: &str) -> String {
    let parsed = parse_str(code);
    assert!(parsed.is_ok(), "parse errors for {code:?}: {:?}", parsed.errors);
    parsed.tree.sexpr(parsed.tree.root())
}

// =============================================================================
// SHAPE
// =============================================================================

#[rstest]
#[case::pipeline("echo a | wc", "(chunk (pipeline (form echo a) (form wc)))")]
#[case::background("sleep 1 &", "(chunk (pipeline& (form sleep 1)))")]
#[case::two_pipelines("a; b\nc", "(chunk (pipeline (form a)) (pipeline (form b)) (pipeline (form c)))")]
#[case::quotes(r#"put 'a b' "c""#, r#"(chunk (pipeline (form put "a b" "c")))"#)]
#[case::index("put $x[0]", "(chunk (pipeline (form put (index $x [0]))))")]
#[case::splice("put $@xs", "(chunk (pipeline (form put $@xs)))")]
#[case::wildcard("ls *.go", "(chunk (pipeline (form ls (concat (wild *) .go))))")]
#[case::tilde("cd ~/src", "(chunk (pipeline (form cd (concat (tilde) /src))))")]
#[case::list("put [1 2]", "(chunk (pipeline (form put (list 1 2))))")]
#[case::map("put [&a=1 &b]", "(chunk (pipeline (form put (map (pair a 1) (pair b)))))")]
#[case::empty_map("put [&]", "(chunk (pipeline (form put (map))))")]
#[case::comment("put a # trailing\n", "(chunk (pipeline (form put a)))")]
#[case::continuation("put a \\\n  b", "(chunk (pipeline (form put a b)))")]
fn tree_shape(#[case] code: &str, #[case] want: &str) {
    assert_eq!(sexpr(code), want);
}

#[test]
fn options_and_redirections() {
    assert_snapshot!(
        sexpr("f x &k=v >out 2>>err"),
        @"(chunk (pipeline (form f x (pair k v) (redir > out) (redir 2>> err))))"
    );
}

#[test]
fn output_capture() {
    assert_snapshot!(
        sexpr("var x = (put a)"),
        @"(chunk (pipeline (form var x = (capture (chunk (pipeline (form put a)))))))"
    );
}

#[test]
fn exception_capture() {
    assert_snapshot!(
        sexpr("put ?(fail x)"),
        @"(chunk (pipeline (form put (try-capture (chunk (pipeline (form fail x)))))))"
    );
}

#[test]
fn lambda_with_params_and_options() {
    assert_snapshot!(
        sexpr("f {|a &o=1| put $a }"),
        @"(chunk (pipeline (form f (lambda [a] (pair o 1) (chunk (pipeline (form put $a)))))))"
    );
}

#[test]
fn double_quoted_escapes() {
    let parsed = parse_str(r#"put "\t\x41\u{263a}\e""#);
    assert!(parsed.is_ok());
    let tree = &parsed.tree;
    let s = tree
        .ids()
        .filter_map(|id| tree.primary(id))
        .find(|p| p.value.starts_with('\t'))
        .expect("quoted primary");
    assert_eq!(s.value, "\tA\u{263a}\x1b");
}

// =============================================================================
// ERRORS
// =============================================================================

#[rstest]
#[case::open_capture("put (")]
#[case::open_list("put [a")]
#[case::open_string("put 'abc")]
#[case::open_lambda("f { put a")]
#[case::dangling_pipe("put a |")]
fn unfinished_input_is_partial(#[case] code: &str) {
    let parsed = parse_str(code);
    assert!(!parsed.is_ok(), "{code:?} should not parse");
    assert!(all_partial(&parsed.errors), "{code:?}: {:?}", parsed.errors);
}

#[test]
fn stray_close_is_not_partial() {
    let parsed = parse_str("put a )");
    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].message, "unexpected rune");
    assert!(!parsed.errors[0].partial);
}

#[test]
fn bad_escape_keeps_going() {
    let parsed = parse_str(r#"put "\q"; put b"#);
    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].message, "invalid escape sequence");
    let tree = &parsed.tree;
    assert_eq!(tree.chunk(tree.root()).map(|c| c.pipelines.len()), Some(2));
}

#[test]
fn diagnostic_format_points_at_the_line() {
    let code = "put a\nput )";
    let parsed = parse_str(code);
    assert_eq!(parsed.errors.len(), 1);
    assert_snapshot!(parsed.errors[0].format(code), @r"
    [test]:2:5: parse error: unexpected rune
      | put )
    ");
}

// =============================================================================
// RANGES
// =============================================================================

/// Every node's children cover its range exactly, in order.
fn assert_tiled(tree: &Tree, id: NodeId) {
    let children = tree.children(id);
    if children.is_empty() {
        return;
    }
    let span = tree.span(id);
    let mut at = tree.span(children[0]).start;
    assert_eq!(at, span.start, "first child of {:?} starts late", tree.text(id));
    for c in children {
        let cs = tree.span(*c);
        assert_eq!(cs.start, at, "gap before {:?} in {:?}", tree.text(*c), tree.text(id));
        at = cs.end;
        assert_eq!(tree.parent(*c), Some(id));
        assert_tiled(tree, *c);
    }
    assert_eq!(at, span.end, "last child of {:?} ends early", tree.text(id));
}

#[rstest]
#[case("echo a | wc x")]
#[case("put [&k=v] (put b) $x[0]")]
#[case("f &opt=1 a > out; g")]
fn children_tile_their_parent(#[case] code: &str) {
    let parsed = parse_str(code);
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let root = parsed.tree.root();
    assert_eq!(parsed.tree.text(root), code);
    assert_tiled(&parsed.tree, root);
}
