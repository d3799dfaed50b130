mod common;

use phpvm_core::ast::build::*;
use phpvm_core::ast::BinaryOperator as B;
use phpvm_core::vm::Failure;
use phpvm_core::RuntimeOptions;

use common::{global_int, output, run, run_with, uncaught_class};

fn line(e: phpvm_core::AstNode) -> phpvm_core::AstNode {
    echo_all(vec![e, string("\n")])
}

#[test]
fn omitted_default_matches_explicit_literal() {
    let scale = func(
        "scale",
        vec![param("x"), param_default("factor", int(10))],
        vec![ret(bin(var("x"), B::Mul, var("factor")))],
    );
    let (_, summary) = run(vec![
        scale,
        set("implicit", call("scale", vec![int(4)])),
        set("explicit", call("scale", vec![int(4), int(10)])),
    ]);
    assert!(summary.failure.is_none());
    assert_eq!(global_int(&summary, "implicit"), global_int(&summary, "explicit"));
    assert_eq!(global_int(&summary, "implicit"), 40);
}

#[test]
fn non_literal_defaults_are_evaluated_per_call() {
    let f = func(
        "size",
        vec![param_default("bytes", bin(name("PHP_INT_SIZE"), B::Mul, int(2)))],
        vec![ret(var("bytes"))],
    );
    let out = output(vec![f, line(call("size", vec![])), line(call("size", vec![int(3)]))]);
    assert_eq!(out, "16\n3\n");
}

#[test]
fn functions_are_hoisted() {
    let out = output(vec![line(call("later", vec![])), func("later", vec![], vec![ret(string("ok"))])]);
    assert_eq!(out, "ok\n");
}

#[test]
fn function_names_are_case_insensitive() {
    let out = output(vec![func("Shout", vec![], vec![ret(string("hey"))]), line(call("SHOUT", vec![]))]);
    assert_eq!(out, "hey\n");
}

#[test]
fn recursion() {
    let fact = func(
        "fact",
        vec![param("n")],
        vec![
            if_(bin(var("n"), B::Le, int(1)), vec![ret(int(1))], None),
            ret(bin(var("n"), B::Mul, call("fact", vec![bin(var("n"), B::Sub, int(1))]))),
        ],
    );
    let out = output(vec![fact, line(call("fact", vec![int(20)]))]);
    assert_eq!(out, "2432902008176640000\n");
}

#[test]
fn by_reference_parameters_write_back() {
    let bump = func("bump", vec![param_ref("n")], vec![stmt(post_inc(var("n")))]);
    let (_, summary) = run(vec![bump, set("a", int(1)), stmt(call("bump", vec![var("a")])), stmt(call("bump", vec![var("a")]))]);
    assert_eq!(global_int(&summary, "a"), 3);
}

#[test]
fn variadics_and_spreading() {
    let total = func(
        "total",
        vec![param("first"), param_variadic("rest")],
        vec![
            set("sum", var("first")),
            foreach(var("rest"), None, var("r"), vec![stmt(compound(B::Add, var("sum"), var("r")))]),
            ret(var("sum")),
        ],
    );
    let out = output(vec![
        total,
        line(call("total", vec![int(1)])),
        line(call("total", vec![int(1), int(2), int(3)])),
        line(call_with("total", vec![arg(int(10)), spread_arg(array(vec![int(20), int(30)]))])),
    ]);
    assert_eq!(out, "1\n6\n60\n");
}

#[test]
fn named_arguments_bind_by_name() {
    let f = func(
        "pair",
        vec![param_default("a", string("A")), param_default("b", string("B"))],
        vec![ret(bin(var("a"), B::Concat, var("b")))],
    );
    let out = output(vec![
        f,
        line(call_with("pair", vec![named_arg("b", string("y"))])),
        line(call_with("pair", vec![named_arg("b", string("2")), named_arg("a", string("1"))])),
    ]);
    assert_eq!(out, "Ay\n12\n");
}

#[test]
fn unknown_named_parameter_is_an_error() {
    let f = func("one", vec![param("a")], vec![ret(var("a"))]);
    let (_, summary) = run(vec![f, stmt(call_with("one", vec![named_arg("zzz", int(1))]))]);
    assert_eq!(uncaught_class(&summary), "Error");
}

#[test]
fn too_few_arguments() {
    let f = func("two", vec![param("a"), param("b")], vec![]);
    let (_, summary) = run(vec![f, stmt(call("two", vec![int(1)]))]);
    match &summary.failure {
        Some(Failure::Uncaught { class, message }) => {
            assert_eq!(class, "ArgumentCountError");
            assert_eq!(message, "Too few arguments to function two(), 1 passed and exactly 2 expected");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn scalar_hints_coerce_in_weak_mode() {
    let f = func("twice", vec![param_typed("n", "int")], vec![ret(bin(var("n"), B::Mul, int(2)))]);
    let out = output(vec![f, line(call("twice", vec![string("21")])), line(call("twice", vec![float(2.0)]))]);
    assert_eq!(out, "42\n4\n");
}

#[test]
fn scalar_hints_reject_incompatible_values() {
    let f = func("twice", vec![param_typed("n", "int")], vec![ret(var("n"))]);
    let (_, summary) = run(vec![f, stmt(call("twice", vec![string("abc")]))]);
    match &summary.failure {
        Some(Failure::Uncaught { class, message }) => {
            assert_eq!(class, "TypeError");
            assert_eq!(message, "twice(): Argument #1 ($n) must be of type int, string given");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn nullable_hint_accepts_null() {
    let f = func("maybe", vec![param_typed("s", "?string")], vec![ret(call("gettype", vec![var("s")]))]);
    let out = output(vec![f, line(call("maybe", vec![null()]))]);
    assert_eq!(out, "NULL\n");
}

#[test]
fn static_variables_persist_between_calls() {
    let counter = func(
        "counter",
        vec![],
        vec![static_var("n", Some(int(0))), stmt(pre_inc(var("n"))), ret(var("n"))],
    );
    let out = output(vec![
        counter,
        stmt(call("counter", vec![])),
        stmt(call("counter", vec![])),
        line(call("counter", vec![])),
    ]);
    assert_eq!(out, "3\n");
}

#[test]
fn global_binds_to_the_top_level_variable() {
    let f = func("touch", vec![], vec![global(&["hits"]), stmt(post_inc(var("hits")))]);
    let (_, summary) = run(vec![f, set("hits", int(5)), stmt(call("touch", vec![])), stmt(call("touch", vec![]))]);
    assert_eq!(global_int(&summary, "hits"), 7);
}

#[test]
fn closures_capture_by_value_and_by_reference() {
    let (out, summary) = run(vec![
        set("x", int(1)),
        set("byval", closure(vec![], vec![use_var("x")], vec![ret(var("x"))])),
        set("byref", closure(vec![], vec![use_ref("x")], vec![stmt(post_inc(var("x")))])),
        set("x", int(10)),
        stmt(call_value(var("byref"), vec![])),
        line(call_value(var("byval"), vec![])),
        line(var("x")),
    ]);
    assert!(summary.failure.is_none(), "{}", out);
    assert_eq!(out, "1\n11\n");
}

#[test]
fn arrow_functions_capture_implicitly() {
    let out = output(vec![
        set("k", int(3)),
        set("mul", arrow_fn(vec![param("v")], bin(var("v"), B::Mul, var("k")))),
        line(call_value(var("mul"), vec![int(5)])),
    ]);
    assert_eq!(out, "15\n");
}

#[test]
fn closures_are_callable_through_the_stdlib() {
    let out = output(vec![
        set("add", closure(vec![param("a"), param("b")], vec![], vec![ret(bin(var("a"), B::Add, var("b")))])),
        line(call("call_user_func", vec![var("add"), int(2), int(3)])),
        line(call("call_user_func_array", vec![var("add"), array_kv(vec![(string("b"), int(1)), (string("a"), int(9))])])),
        line(call("call_user_func", vec![string("strlen"), string("four")])),
        line(ternary(call("is_callable", vec![var("add")]), Some(string("yes")), string("no"))),
        line(call("gettype", vec![var("add")])),
    ]);
    assert_eq!(out, "5\n10\n4\nyes\nobject\n");
}

#[test]
fn func_get_args_sees_every_argument() {
    let f = func("spy", vec![param("a")], vec![ret(call("count", vec![call("func_get_args", vec![])]))]);
    let out = output(vec![f, line(call("spy", vec![int(1), int(2), int(3)]))]);
    assert_eq!(out, "3\n");
}

#[test]
fn undefined_function_is_an_error() {
    let (_, summary) = run(vec![stmt(call("nope", vec![]))]);
    match &summary.failure {
        Some(Failure::Uncaught { class, message }) => {
            assert_eq!(class, "Error");
            assert_eq!(message, "Call to undefined function nope()");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn runaway_recursion_hits_the_depth_limit() {
    let f = func("down", vec![], vec![ret(call("down", vec![]))]);
    let options = RuntimeOptions { max_call_depth: 64, ..RuntimeOptions::default() };
    let (out, summary) = run_with(options, vec![f, stmt(call("down", vec![]))]);
    assert!(matches!(summary.failure, Some(Failure::Fatal(_))), "{:?}", summary.failure);
    assert_eq!(summary.exit_code, 255);
    assert!(out.contains("Maximum function nesting level of '64' reached"), "{}", out);
}

#[test]
fn step_budget_stops_infinite_loops() {
    let options = RuntimeOptions { max_steps: Some(10_000), ..RuntimeOptions::default() };
    let (_, summary) = run_with(options, vec![while_(boolean(true), vec![])]);
    assert!(matches!(summary.failure, Some(Failure::Fatal(_))));
}

#[test]
fn exit_sets_the_status_without_a_failure() {
    let (out, summary) = run(vec![echo(string("before")), exit(Some(int(3))), echo(string("after"))]);
    assert_eq!(out, "before");
    assert_eq!(summary.exit_code, 3);
    assert!(summary.failure.is_none());
}

#[test]
fn global_reads_and_writes_reach_top_level_code() {
    let show = func("show", vec![], vec![global(&["x"]), line(var("x"))]);
    let setx = func("setx", vec![], vec![global(&["x"]), set("x", int(9))]);
    let out = output(vec![
        show,
        setx,
        set("x", int(5)),
        stmt(call("show", vec![])),
        stmt(call("setx", vec![])),
        line(var("x")),
    ]);
    assert_eq!(out, "5\n9\n");
}

#[test]
fn global_defines_a_variable_for_later_top_level_code() {
    let init = func("init", vec![], vec![global(&["fresh"]), set("fresh", string("made"))]);
    let (out, summary) = run(vec![init, stmt(call("init", vec![])), line(var("fresh"))]);
    assert_eq!(out, "made\n");
    assert!(summary.globals.contains_key("fresh"));
}

#[test]
fn by_reference_write_back_shows_in_output() {
    let bump = func("bump", vec![param_ref("n")], vec![stmt(post_inc(var("n")))]);
    let out = output(vec![
        bump,
        set("a", int(1)),
        stmt(call("bump", vec![var("a")])),
        stmt(call("bump", vec![var("a")])),
        line(var("a")),
    ]);
    assert_eq!(out, "3\n");
}

#[test]
fn unset_breaks_a_top_level_reference_without_detaching_the_global() {
    let peek = func("peek", vec![], vec![global(&["b"]), line(var("b"))]);
    let out = output(vec![
        peek,
        set("a", int(1)),
        assign_ref(var("b"), var("a")),
        unset(vec![var("b")]),
        set("b", int(2)),
        line(var("a")),
        stmt(call("peek", vec![])),
    ]);
    assert_eq!(out, "1\n2\n");
}
