mod common;

use phpvm_core::ast::build::*;
use phpvm_core::ast::{ArrayItem, AstNodeKind, BinaryOperator as B};
use phpvm_core::vm::Value;
use phpvm_core::{AstNode, RuntimeOptions};

use common::{global, global_int, output, run, run_with};

fn line(e: AstNode) -> AstNode {
    echo_all(vec![e, string("\n")])
}

fn join(v: &str) -> AstNode {
    foreach(var(v), None, var("item"), vec![echo_all(vec![var("item"), string(",")])])
}

#[test]
fn assignment_copies_on_write() {
    let (out, summary) = run(vec![
        set("a", array(vec![int(1), int(2), int(3)])),
        set("b", var("a")),
        assign(append(var("b")), int(4)),
        assign(index(var("b"), int(0)), int(100)),
        line(call("count", vec![var("a")])),
        line(index(var("a"), int(0))),
        line(call("count", vec![var("b")])),
    ]);
    assert!(summary.failure.is_none(), "{}", out);
    assert_eq!(out, "3\n1\n4\n");
}

#[test]
fn nested_arrays_copy_independently() {
    let out = output(vec![
        set("m", array(vec![array(vec![int(1)])])),
        set("n", var("m")),
        assign(index(index(var("n"), int(0)), int(0)), int(9)),
        line(index(index(var("m"), int(0)), int(0))),
        line(index(index(var("n"), int(0)), int(0))),
    ]);
    assert_eq!(out, "1\n9\n");
}

#[test]
fn references_share_storage() {
    let (_, summary) = run(vec![
        set("a", array(vec![int(1)])),
        assign_ref(var("r"), var("a")),
        assign(append(var("r")), int(2)),
    ]);
    match global(&summary, "a") {
        Value::Array(a) => assert_eq!(a.len(), 2),
        other => panic!("{:?}", other),
    }
}

#[test]
fn arrays_passed_to_functions_are_copies() {
    let f = func("mutate", vec![param("xs")], vec![assign(append(var("xs")), int(99)), ret(call("count", vec![var("xs")]))]);
    let out = output(vec![
        f,
        set("xs", array(vec![int(1)])),
        line(call("mutate", vec![var("xs")])),
        line(call("count", vec![var("xs")])),
    ]);
    assert_eq!(out, "2\n1\n");
}

#[test]
fn keys_are_normalized() {
    let out = output(vec![
        set(
            "a",
            array_kv(vec![
                (string("1"), string("first")),
                (int(1), string("second")),
                (boolean(true), string("third")),
                (string("01"), string("kept")),
                (null(), string("empty")),
            ]),
        ),
        line(call("count", vec![var("a")])),
        line(index(var("a"), int(1))),
        line(index(var("a"), string("01"))),
        line(index(var("a"), string(""))),
    ]);
    assert_eq!(out, "3\nthird\nkept\nempty\n");
}

#[test]
fn append_continues_after_the_largest_integer_key() {
    let out = output(vec![
        set("a", array_kv(vec![(int(5), string("five")), (string("x"), string("ex"))])),
        assign(append(var("a")), string("six")),
        foreach(var("a"), Some(var("k")), var("v"), vec![echo_all(vec![var("k"), string("="), var("v"), string(" ")])]),
    ]);
    assert_eq!(out, "5=five x=ex 6=six ");
}

#[test]
fn writes_autovivify_nested_arrays() {
    let (_, summary) = run(vec![
        assign(index(index(var("cfg"), string("db")), string("host")), string("localhost")),
        assign(append(index(var("cfg"), string("list"))), int(1)),
    ]);
    assert!(summary.failure.is_none());
    let Value::Array(cfg) = global(&summary, "cfg") else { panic!("cfg is not an array") };
    assert_eq!(cfg.len(), 2);
}

#[test]
fn unset_removes_elements_and_keeps_order() {
    let out = output(vec![
        set("a", array(vec![string("a"), string("b"), string("c")])),
        unset(vec![index(var("a"), int(1))]),
        join("a"),
        assign(append(var("a")), string("d")),
        line(call("count", vec![var("a")])),
        foreach(var("a"), Some(var("k")), var("v"), vec![echo(var("k"))]),
    ]);
    assert_eq!(out, "a,c,3\n023");
}

#[test]
fn isset_and_empty_on_elements() {
    let show = |e| echo(ternary(e, Some(string("T")), string("F")));
    let out = output(vec![
        set("a", array_kv(vec![(string("zero"), int(0)), (string("nil"), null())])),
        show(isset(vec![index(var("a"), string("zero"))])),
        show(isset(vec![index(var("a"), string("nil"))])),
        show(isset(vec![index(var("a"), string("missing"))])),
        show(empty(index(var("a"), string("zero")))),
        show(empty(index(var("a"), string("missing")))),
        show(isset(vec![index(index(var("a"), string("missing")), string("deeper"))])),
    ]);
    assert_eq!(out, "TFFTTF");
}

#[test]
fn missing_keys_read_as_null_with_a_warning() {
    let options = RuntimeOptions { display_warnings: true, ..RuntimeOptions::default() };
    let (out, summary) = run_with(options, vec![
        set("a", array(vec![])),
        set("v", index(var("a"), string("nope"))),
    ]);
    assert!(summary.failure.is_none());
    assert!(matches!(global(&summary, "v"), Value::Null));
    assert!(out.contains("Warning: Undefined array key \"nope\""), "{}", out);
}

#[test]
fn string_offsets_read_single_bytes() {
    let out = output(vec![
        set("s", string("abc")),
        line(index(var("s"), int(1))),
        line(index(var("s"), int(-1))),
    ]);
    assert_eq!(out, "b\nc\n");
}

#[test]
fn foreach_by_value_iterates_a_snapshot() {
    let out = output(vec![
        set("a", array(vec![int(1), int(2)])),
        foreach(var("a"), None, var("v"), vec![assign(append(var("a")), var("v")), echo(var("v"))]),
        line(string("")),
        line(call("count", vec![var("a")])),
    ]);
    assert_eq!(out, "12\n4\n");
}

#[test]
fn foreach_by_reference_writes_back() {
    let (out, summary) = run(vec![
        set("a", array(vec![int(1), int(2), int(3)])),
        foreach_ref(var("a"), var("v"), vec![stmt(compound(B::Mul, var("v"), int(2)))]),
        join("a"),
    ]);
    assert!(summary.failure.is_none(), "{}", out);
    assert_eq!(out, "2,4,6,");
}

#[test]
fn foreach_with_keys() {
    let out = output(vec![
        set("m", array_kv(vec![(string("a"), int(1)), (string("b"), int(2))])),
        foreach(var("m"), Some(var("k")), var("v"), vec![echo_all(vec![var("k"), var("v")])]),
    ]);
    assert_eq!(out, "a1b2");
}

#[test]
fn nested_foreach_with_break_and_continue() {
    let out = output(vec![
        set("rows", array(vec![array(vec![int(1), int(2), int(3)]), array(vec![int(4), int(5), int(6)])])),
        foreach(
            var("rows"),
            None,
            var("row"),
            vec![foreach(
                var("row"),
                None,
                var("cell"),
                vec![
                    if_(bin(var("cell"), B::Identical, int(2)), vec![continue_(1)], None),
                    if_(bin(var("cell"), B::Identical, int(5)), vec![break_(2)], None),
                    echo(var("cell")),
                ],
            )],
        ),
    ]);
    assert_eq!(out, "134");
}

#[test]
fn list_destructuring() {
    let (_, summary) = run(vec![
        assign(list(vec![var("a"), var("b")]), array(vec![int(10), int(20), int(30)])),
        set("pairs", array(vec![array(vec![int(1), int(2)]), array(vec![int(3), int(4)])])),
        set("sum", int(0)),
        foreach(var("pairs"), None, list(vec![var("x"), var("y")]), vec![stmt(compound(B::Add, var("sum"), bin(var("x"), B::Mul, var("y"))))]),
    ]);
    assert!(summary.failure.is_none());
    assert_eq!(global_int(&summary, "a"), 10);
    assert_eq!(global_int(&summary, "b"), 20);
    assert_eq!(global_int(&summary, "sum"), 14);
}

#[test]
fn swap_through_destructuring() {
    let (_, summary) = run(vec![
        set("x", int(1)),
        set("y", int(2)),
        assign(list(vec![var("x"), var("y")]), array(vec![var("y"), var("x")])),
    ]);
    assert_eq!(global_int(&summary, "x"), 2);
    assert_eq!(global_int(&summary, "y"), 1);
}

#[test]
fn spread_inside_array_literals() {
    let mut all = array(vec![int(1)]);
    if let AstNodeKind::ArrayLiteral { items } = &mut all.kind {
        items.push(ArrayItem { key: None, value: var("tail"), by_ref: false, unpack: true });
    }
    let out = output(vec![set("tail", array(vec![int(2), int(3)])), set("all", all), join("all")]);
    assert_eq!(out, "1,2,3,");
}

#[test]
fn var_dump_format() {
    let out = output(vec![stmt(call(
        "var_dump",
        vec![array_kv(vec![
            (int(0), int(1)),
            (string("a"), string("x")),
            (int(1), float(2.5)),
            (int(2), boolean(true)),
            (int(3), null()),
            (int(4), array(vec![])),
        ])],
    ))]);
    let expected = "array(6) {\n  [0]=>\n  int(1)\n  [\"a\"]=>\n  string(1) \"x\"\n  [1]=>\n  float(2.5)\n  [2]=>\n  bool(true)\n  [3]=>\n  NULL\n  [4]=>\n  array(0) {\n  }\n}\n";
    assert_eq!(out, expected);
}

#[test]
fn array_comparison() {
    let show = |e| echo(ternary(e, Some(string("T")), string("F")));
    let out = output(vec![
        show(bin(array(vec![int(1), int(2)]), B::Eq, array_kv(vec![(int(1), int(2)), (int(0), int(1))]))),
        show(bin(array(vec![int(1), int(2)]), B::Identical, array_kv(vec![(int(1), int(2)), (int(0), int(1))]))),
        show(bin(array(vec![string("1")]), B::Eq, array(vec![int(1)]))),
        show(bin(array(vec![int(1)]), B::Lt, array(vec![int(1), int(0)]))),
    ]);
    assert_eq!(out, "TFTT");
}

#[test]
fn array_union_keeps_left_keys() {
    let out = output(vec![
        set("u", bin(array(vec![string("a"), string("b")]), B::Add, array(vec![string("x"), string("y"), string("z")]))),
        join("u"),
    ]);
    assert_eq!(out, "a,b,z,");
}
