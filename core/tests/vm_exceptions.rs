mod common;

use phpvm_core::ast::build::*;
use phpvm_core::ast::BinaryOperator as B;
use phpvm_core::vm::Failure;
use phpvm_core::AstNode;

use common::{output, run, uncaught_class};

fn line(e: AstNode) -> AstNode {
    echo_all(vec![e, string("\n")])
}

fn boom(class: &str, message: &str) -> AstNode {
    throw(new_object(class, vec![string(message)]))
}

fn message_of(v: &str) -> AstNode {
    method_call(var(v), "getMessage", vec![])
}

#[test]
fn finally_runs_once_on_normal_completion() {
    let out = output(vec![
        try_(vec![echo(string("body "))], vec![], Some(vec![echo(string("finally "))])),
        echo(string("after")),
    ]);
    assert_eq!(out, "body finally after");
}

#[test]
fn finally_runs_once_when_the_exception_is_caught() {
    let out = output(vec![
        try_(
            vec![boom("Exception", "x"), echo(string("skipped "))],
            vec![catch(&["Exception"], Some("e"), vec![echo(bin(string("caught:"), B::Concat, message_of("e"))), echo(string(" "))])],
            Some(vec![echo(string("finally "))]),
        ),
        echo(string("after")),
    ]);
    assert_eq!(out, "caught:x finally after");
}

#[test]
fn finally_runs_once_when_the_exception_escapes() {
    let risky = func(
        "risky",
        vec![],
        vec![try_(vec![boom("RuntimeException", "escape")], vec![], Some(vec![echo(string("finally "))]))],
    );
    let out = output(vec![
        risky,
        try_(vec![stmt(call("risky", vec![]))], vec![catch(&["RuntimeException"], Some("e"), vec![echo(message_of("e"))])], None),
    ]);
    assert_eq!(out, "finally escape");
}

#[test]
fn finally_runs_once_on_early_return() {
    let early = func(
        "early",
        vec![],
        vec![
            try_(vec![ret(string("returned")), echo(string("skipped"))], vec![], Some(vec![echo(string("finally "))])),
            ret(string("fell through")),
        ],
    );
    let out = output(vec![early, echo(call("early", vec![]))]);
    assert_eq!(out, "finally returned");
}

#[test]
fn return_in_finally_overrides() {
    let f = func("f", vec![], vec![try_(vec![ret(int(1))], vec![], Some(vec![ret(int(2))]))]);
    let out = output(vec![f, echo(call("f", vec![]))]);
    assert_eq!(out, "2");
}

#[test]
fn break_passes_through_finally() {
    let out = output(vec![
        for_(
            vec![assign(var("i"), int(0))],
            vec![bin(var("i"), B::Lt, int(5))],
            vec![post_inc(var("i"))],
            vec![try_(
                vec![if_(bin(var("i"), B::Identical, int(1)), vec![break_(1)], None), echo(var("i"))],
                vec![],
                Some(vec![echo(string("f"))]),
            )],
        ),
        echo(string("|")),
    ]);
    assert_eq!(out, "0ff|");
}

#[test]
fn exception_from_a_catch_block_still_runs_finally() {
    let (out, summary) = run(vec![
        try_(
            vec![boom("LogicException", "first")],
            vec![catch(&["LogicException"], None, vec![boom("RuntimeException", "second")])],
            Some(vec![echo(string("finally\n"))]),
        ),
        echo(string("unreachable")),
    ]);
    assert!(out.starts_with("finally\n"), "{}", out);
    assert!(!out.contains("unreachable"));
    assert_eq!(uncaught_class(&summary), "RuntimeException");
}

#[test]
fn clauses_match_in_source_order_against_the_hierarchy() {
    let out = output(vec![
        try_(
            vec![boom("InvalidArgumentException", "bad")],
            vec![
                catch(&["RuntimeException"], None, vec![echo(string("runtime"))]),
                catch(&["LogicException"], Some("e"), vec![echo(bin(string("logic:"), B::Concat, call("get_class", vec![var("e")])))]),
                catch(&["Exception"], None, vec![echo(string("generic"))]),
            ],
            None,
        ),
    ]);
    assert_eq!(out, "logic:InvalidArgumentException");
}

#[test]
fn multi_type_catch_and_throwable() {
    let out = output(vec![
        try_(
            vec![stmt(call("intdiv", vec![int(1), int(0)]))],
            vec![catch(&["TypeError", "ArithmeticError"], Some("e"), vec![line(call("get_class", vec![var("e")]))])],
            None,
        ),
        try_(
            vec![stmt(bin(int(1), B::Mod, int(0)))],
            vec![catch(&["Throwable"], Some("e"), vec![line(message_of("e"))])],
            None,
        ),
    ]);
    assert_eq!(out, "DivisionByZeroError\nModulo by zero\n");
}

#[test]
fn user_exceptions_extend_the_builtin_ones() {
    let mut my = class_decl("NotFound");
    my.parent = Some("RuntimeException".into());
    my.methods.push(method(
        "__construct",
        vec![param("what")],
        vec![stmt(static_call("parent", "__construct", vec![bin(string("missing "), B::Concat, var("what")), int(404)]))],
    ));
    let out = output(vec![
        class(my),
        try_(
            vec![throw(new_object("NotFound", vec![string("page")]))],
            vec![catch(
                &["RuntimeException"],
                Some("e"),
                vec![
                    line(message_of("e")),
                    line(method_call(var("e"), "getCode", vec![])),
                    line(ternary(instance_of(var("e"), "Throwable"), Some(string("throwable")), string("?"))),
                ],
            )],
            None,
        ),
    ]);
    assert_eq!(out, "missing page\n404\nthrowable\n");
}

#[test]
fn previous_exceptions_chain() {
    let out = output(vec![
        set("inner", new_object("LogicException", vec![string("root cause")])),
        set("outer", new_object("RuntimeException", vec![string("wrapper"), int(0), var("inner")])),
        line(method_call(method_call(var("outer"), "getPrevious", vec![]), "getMessage", vec![])),
        line(call("gettype", vec![method_call(var("inner"), "getPrevious", vec![])])),
    ]);
    assert_eq!(out, "root cause\nNULL\n");
}

#[test]
fn throwing_a_non_object_is_an_error() {
    let (_, summary) = run(vec![throw(string("nope"))]);
    match &summary.failure {
        Some(Failure::Uncaught { class, message }) => {
            assert_eq!(class, "Error");
            assert_eq!(message, "Can only throw objects");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn unhandled_match_reports_the_subject() {
    let (_, summary) = run(vec![echo(match_(int(5), vec![(Some(vec![int(1)]), string("one"))]))]);
    match &summary.failure {
        Some(Failure::Uncaught { class, message }) => {
            assert_eq!(class, "UnhandledMatchError");
            assert_eq!(message, "Unhandled match case 5");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn uncaught_exception_runs_every_finally_innermost_first() {
    let level = |name: &str, callee: Option<&str>, call_line: usize| {
        let body = match callee {
            Some(c) => stmt(call(c, vec![])).at_line(call_line),
            None => boom("LogicException", "deep").at_line(call_line),
        };
        func(name, vec![], vec![try_(vec![body], vec![], Some(vec![echo(string(&format!("{} finally\n", name)))]))])
    };
    let (out, summary) = run(vec![
        level("inner", None, 3),
        level("middle", Some("inner"), 6),
        level("outer", Some("middle"), 9),
        stmt(call("outer", vec![])).at_line(12),
        echo(string("unreachable")),
    ]);
    let expected = "inner finally\n\
                    middle finally\n\
                    outer finally\n\
                    PHP Fatal error:  Uncaught LogicException: deep in test.php:3\n\
                    Stack trace:\n\
                    #0 test.php(6): inner()\n\
                    #1 test.php(9): middle()\n\
                    #2 test.php(12): outer()\n\
                    #3 {main}\n  thrown in test.php on line 3\n";
    assert_eq!(out, expected);
    assert_eq!(summary.exit_code, 255);
    match &summary.failure {
        Some(Failure::Uncaught { class, message }) => {
            assert_eq!(class, "LogicException");
            assert_eq!(message, "deep");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn exception_to_string_matches_the_report_body() {
    let out = output(vec![
        set("e", new_object("Exception", vec![string("shown")])).at_line(2),
        echo(var("e")),
    ]);
    assert_eq!(out, "Exception: shown in test.php:2\nStack trace:\n#0 {main}");
}

#[test]
fn method_frames_appear_in_traces() {
    let mut svc = class_decl("Service");
    svc.methods.push(method("run", vec![], vec![boom("Exception", "in method").at_line(4)]));
    let (out, _) = run(vec![class(svc), stmt(method_call(new_object("Service", vec![]), "run", vec![])).at_line(7)]);
    assert!(out.contains("#0 test.php(7): Service->run()\n#1 {main}"), "{}", out);
}
