//! End-to-end evaluation: variables, closures, control flow, captures and
//! exceptions, driven through `Evaler::eval_capture`.

mod common;

use common::{reprs, run, values};
use rstest::rstest;
use tern_kernel::{Cause, EvalError, Value};

fn cause(out: &tern_kernel::Captured) -> &Cause {
    match &out.result {
        Err(EvalError::Exception(e)) => &e.cause,
        other => panic!("expected an exception, got {other:?}"),
    }
}

// =============================================================================
// VARIABLES
// =============================================================================

#[rstest]
#[case::multiple("var a b = 1 2; put $b $a", &["2", "1"])]
#[case::rest("var a @b c = 1 2 3 4; put $a $b $c", &["1", "[2 3]", "4"])]
#[case::empty_rest("var a @b = 1; put $b", &["[]"])]
#[case::unset("var x; put $x", &["$nil"])]
#[case::set("var x = 1; set x = 2; put $x", &["2"])]
#[case::indexed_set("var l = [a b]; set l[1] = c; put $l", &["[a c]"])]
#[case::nested_set("var m = [&k=[&]]; set m[k][j] = v; put $m", &["[&k=[&j=v]]"])]
#[case::del_key("var m = [&a=1 &b=2]; del m[a]; put $m", &["[&b=2]"])]
#[case::splice("var l = [a b]; put $@l", &["a", "b"])]
#[tokio::test]
async fn variables(#[case] code: &str, #[case] want: &[&str]) {
    assert_eq!(reprs(code).await, want);
}

#[tokio::test]
async fn assignment_arity_is_checked() {
    let out = run("var a b = 1").await;
    assert!(matches!(cause(&out), Cause::Arity { got: 1, .. }));
}

#[tokio::test]
async fn env_variables() {
    assert_eq!(
        values("set E:TERN_EVAL_TEST = hello; put $E:TERN_EVAL_TEST").await,
        vec![Value::str("hello")]
    );
    assert_eq!(values("put $E:TERN_SURELY_UNSET_VAR").await, vec![Value::str("")]);
}

// =============================================================================
// VALUES
// =============================================================================

#[rstest]
#[case::index("var l = [a b c]; put $l[0] $l[-1]", &["a", "c"])]
#[case::slice("var l = [a b c]; put $l[1..]", &["[b c]"])]
#[case::string_index("put abc[1]", &["b"])]
#[case::map_index("var m = [&k=v]; put $m[k]", &["v"])]
#[case::concat("var x = b; put a$x'c'", &["abc"])]
#[case::cartesian("var l = [a b]; put $@l'-'", &["a-", "b-"])]
#[case::capture_values_then_lines("put [(echo l; put v)]", &["[v l]"])]
#[case::exception_ok("put ?(nop)", &["$ok"])]
#[case::exception_fail("put ?(fail x)", &["[^exception &reason=x]"])]
#[case::truthiness("bool '' ; bool $nil; bool ?(fail x)", &["$true", "$false", "$false"])]
#[tokio::test]
async fn values_and_indexing(#[case] code: &str, #[case] want: &[&str]) {
    assert_eq!(reprs(code).await, want);
}

#[tokio::test]
async fn index_out_of_range() {
    let out = run("var l = [a]; put $l[3]").await;
    assert!(matches!(cause(&out), Cause::BadValue { .. }));
}

#[tokio::test]
async fn numbers() {
    assert_eq!(
        reprs("+ 1 2; / 1 3; * 2 3; - 5; num 1.5").await,
        ["(num 3)", "(num 1/3)", "(num 6)", "(num -5)", "(num 1.5)"]
    );
    assert_eq!(reprs("range 3").await, ["(num 0)", "(num 1)", "(num 2)"]);
}

// =============================================================================
// FUNCTIONS
// =============================================================================

#[tokio::test]
async fn closures_share_captured_cells() {
    let code = "fn make { var n = 0; put { set n = (+ $n 1); put $n } }
                var c = (make)
                $c; $c";
    assert_eq!(reprs(code).await, ["(num 1)", "(num 2)"]);
}

#[tokio::test]
async fn options_with_defaults() {
    let code = "fn greet {|&name=world| put hello-$name }; greet; greet &name=you";
    assert_eq!(reprs(code).await, ["hello-world", "hello-you"]);

    let out = run("fn f {|&a=1| }; f &b=2").await;
    assert!(matches!(cause(&out), Cause::BadValue { .. }));
}

#[tokio::test]
async fn closure_arity() {
    let out = run("fn f {|a| }; f 1 2").await;
    assert!(matches!(cause(&out), Cause::Arity { got: 2, .. }));
    assert_eq!(reprs("fn f {|a @rest| put $rest }; f 1 2 3").await, ["[2 3]"]);
}

#[tokio::test]
async fn functions_see_later_definitions() {
    assert_eq!(reprs("fn a { b }; fn b { put ran }; a").await, ["ran"]);
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

#[rstest]
#[case::if_else("if $false { put a } elif $true { put b } else { put c }", &["b"])]
#[case::if_no_branch("if $false { put a }", &[])]
#[case::while_loop("var i = 0; while (< $i 2) { put $i; set i = (+ $i 1) }", &["0", "(num 1)"])]
#[case::while_else("while $false { } else { put none }", &["none"])]
#[case::for_continue("for x [a b c] { if (eq $x b) { continue }; put $x }", &["a", "c"])]
#[case::for_break("for x [a b c] { if (eq $x b) { break }; put $x }", &["a"])]
#[case::for_else("for x [] { put $x } else { put empty }", &["empty"])]
#[case::each_break("each {|x| if (eq $x 2) { break }; put $x } [1 2 3]", &["1"])]
#[case::and("and a $false b", &["$false"])]
#[case::or("or $false $nil c", &["c"])]
#[case::and_empty("and", &["$true"])]
#[tokio::test]
async fn control_flow(#[case] code: &str, #[case] want: &[&str]) {
    assert_eq!(reprs(code).await, want);
}

#[rstest]
#[case::caught("try { fail boom } catch e { put $e } finally { put fin }", &["[^exception &reason=boom]", "fin"])]
#[case::not_caught("try { nop } catch { put caught } else { put fine } finally { put fin }", &["fine", "fin"])]
#[tokio::test]
async fn try_forms(#[case] code: &str, #[case] want: &[&str]) {
    assert_eq!(reprs(code).await, want);
}

#[tokio::test]
async fn finally_runs_when_uncaught() {
    let out = run("try { fail boom } finally { put cleanup }").await;
    assert_eq!(out.values, vec![Value::str("cleanup")]);
    assert!(matches!(cause(&out), Cause::Fail(m) if m == "boom"));
}

#[tokio::test]
async fn try_does_not_catch_flow() {
    let out = run("for x [a b] { try { break } catch { put caught }; put $x }").await;
    out.result.unwrap();
    assert!(out.values.is_empty());
}

// =============================================================================
// EXCEPTIONS
// =============================================================================

#[tokio::test]
async fn exception_stack_points_into_source() {
    let out = run("fn f { fail deep }\nf").await;
    let Err(EvalError::Exception(e)) = &out.result else {
        panic!("expected an exception");
    };
    let rendered = e.render();
    assert!(rendered.starts_with("Exception: deep"), "{rendered}");
    assert!(rendered.contains("[test]:1:8: fail deep"), "{rendered}");
    assert!(rendered.contains("[test]:2:1: f"), "{rendered}");
}

#[tokio::test]
async fn parse_and_compile_errors_do_not_run() {
    let out = run("put a; put (").await;
    assert!(matches!(out.result, Err(EvalError::Parse(_))));
    assert!(out.values.is_empty());

    let out = run("put a; put $nope").await;
    let Err(EvalError::Compile(diags)) = &out.result else {
        panic!("expected compile errors");
    };
    assert_eq!(diags[0].message, "variable $nope not found");
    assert!(out.values.is_empty());
}

// =============================================================================
// BYTES
// =============================================================================

#[tokio::test]
async fn byte_output() {
    let out = run("echo a b; print &sep=, x y; echo").await;
    out.result.as_ref().unwrap();
    assert_eq!(out.text(), "a b\nx,y\n");
}

#[tokio::test]
async fn redirections() {
    let path = std::env::temp_dir().join(format!("tern-redir-{}.txt", std::process::id()));
    let p = path.to_string_lossy().into_owned();
    let code = format!("echo one > '{p}'; echo two >> '{p}'; slurp < '{p}'");
    let got = values(&code).await;
    let _ = std::fs::remove_file(&path);
    assert_eq!(got, vec![Value::str("one\ntwo\n")]);
}

#[tokio::test]
async fn wildcard_without_match_fails() {
    let out = run("put *.tern-no-such-extension").await;
    assert!(matches!(cause(&out), Cause::Fail(m) if m.starts_with("wildcard has no match")));
}
