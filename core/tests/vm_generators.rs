mod common;

use phpvm_core::ast::build::*;
use phpvm_core::ast::BinaryOperator as B;
use phpvm_core::AstNode;

use common::{output, run, uncaught_class};

fn line(e: AstNode) -> AstNode {
    echo_all(vec![e, string("\n")])
}

fn one_two() -> AstNode {
    func("one_two", vec![], vec![stmt(yield_value(int(1))), stmt(yield_value(int(2)))])
}

#[test]
fn foreach_drives_a_generator() {
    let out = output(vec![
        one_two(),
        foreach(call("one_two", vec![]), None, var("v"), vec![line(var("v"))]),
        echo(string("done")),
    ]);
    assert_eq!(out, "1\n2\ndone");
}

#[test]
fn manual_iteration_with_methods() {
    let out = output(vec![
        one_two(),
        set("g", call("one_two", vec![])),
        line(method_call(var("g"), "current", vec![])),
        stmt(method_call(var("g"), "next", vec![])),
        line(method_call(var("g"), "current", vec![])),
        stmt(method_call(var("g"), "next", vec![])),
        line(ternary(method_call(var("g"), "valid", vec![]), Some(string("valid")), string("finished"))),
        line(call("gettype", vec![method_call(var("g"), "current", vec![])])),
    ]);
    assert_eq!(out, "1\n2\nfinished\nNULL\n");
}

#[test]
fn instances_are_independent() {
    let out = output(vec![
        one_two(),
        set("a", call("one_two", vec![])),
        set("b", call("one_two", vec![])),
        echo(method_call(var("a"), "current", vec![])),
        stmt(method_call(var("a"), "next", vec![])),
        echo(method_call(var("a"), "current", vec![])),
        echo(method_call(var("b"), "current", vec![])),
    ]);
    assert_eq!(out, "121");
}

#[test]
fn body_does_not_run_until_first_use() {
    let lazy = func("lazy", vec![], vec![echo(string("started ")), stmt(yield_value(int(1)))]);
    let out = output(vec![
        lazy,
        set("g", call("lazy", vec![])),
        echo(string("created ")),
        echo(method_call(var("g"), "current", vec![])),
    ]);
    assert_eq!(out, "created started 1");
}

#[test]
fn explicit_and_automatic_keys() {
    let pairs = func(
        "pairs",
        vec![],
        vec![
            stmt(yield_pair(string("a"), int(1))),
            stmt(yield_value(int(2))),
            stmt(yield_pair(int(10), int(3))),
            stmt(yield_value(int(4))),
        ],
    );
    let out = output(vec![
        pairs,
        foreach(
            call("pairs", vec![]),
            Some(var("k")),
            var("v"),
            vec![echo_all(vec![var("k"), string("="), var("v"), string(" ")])],
        ),
    ]);
    assert_eq!(out, "a=1 0=2 10=3 11=4 ");
}

#[test]
fn send_delivers_values_into_the_body() {
    let acc = func(
        "acc",
        vec![],
        vec![
            set("total", int(0)),
            while_(
                boolean(true),
                vec![
                    set("x", yield_value(var("total"))),
                    stmt(compound(B::Add, var("total"), var("x"))),
                ],
            ),
        ],
    );
    let out = output(vec![
        acc,
        set("g", call("acc", vec![])),
        line(method_call(var("g"), "current", vec![])),
        line(method_call(var("g"), "send", vec![int(5)])),
        line(method_call(var("g"), "send", vec![int(10)])),
    ]);
    assert_eq!(out, "0\n5\n15\n");
}

#[test]
fn send_before_start_runs_to_the_first_yield() {
    let echoer = func(
        "echoer",
        vec![],
        vec![
            set("got", yield_value(string("first"))),
            line(bin(string("got "), B::Concat, var("got"))),
            stmt(yield_value(string("second"))),
        ],
    );
    let out = output(vec![
        echoer,
        set("g", call("echoer", vec![])),
        line(method_call(var("g"), "send", vec![string("hello")])),
    ]);
    assert_eq!(out, "got hello\nsecond\n");
}

#[test]
fn get_return_after_completion() {
    let g = func("g", vec![], vec![stmt(yield_value(int(1))), ret(int(99))]);
    let out = output(vec![
        g,
        set("gen", call("g", vec![])),
        foreach(var("gen"), None, var("v"), vec![]),
        line(method_call(var("gen"), "getReturn", vec![])),
    ]);
    assert_eq!(out, "99\n");
}

#[test]
fn get_return_before_completion_throws() {
    let g = func("g", vec![], vec![stmt(yield_value(int(1))), ret(int(99))]);
    let (_, summary) = run(vec![
        g,
        set("gen", call("g", vec![])),
        stmt(method_call(var("gen"), "getReturn", vec![])),
    ]);
    assert_eq!(uncaught_class(&summary), "Exception");
}

#[test]
fn yield_from_delegates_and_returns_the_inner_result() {
    let inner = func(
        "inner",
        vec![],
        vec![stmt(yield_value(int(1))), stmt(yield_value(int(2))), ret(int(3))],
    );
    let outer = func(
        "outer",
        vec![],
        vec![set("r", yield_from(call("inner", vec![]))), stmt(yield_value(var("r")))],
    );
    let out = output(vec![
        inner,
        outer,
        foreach(call("outer", vec![]), None, var("v"), vec![echo(var("v"))]),
    ]);
    assert_eq!(out, "123");
}

#[test]
fn yield_from_an_array() {
    let g = func(
        "g",
        vec![],
        vec![stmt(yield_from(array(vec![int(10), int(20)]))), stmt(yield_value(int(30)))],
    );
    let out = output(vec![
        g,
        foreach(call("g", vec![]), None, var("v"), vec![echo_all(vec![var("v"), string(" ")])]),
    ]);
    assert_eq!(out, "10 20 30 ");
}

#[test]
fn rewinding_an_advanced_generator_throws() {
    let (_, summary) = run(vec![
        one_two(),
        set("g", call("one_two", vec![])),
        stmt(method_call(var("g"), "current", vec![])),
        stmt(method_call(var("g"), "next", vec![])),
        foreach(var("g"), None, var("v"), vec![]),
    ]);
    assert_eq!(uncaught_class(&summary), "Exception");
}

#[test]
fn throw_resumes_inside_the_body() {
    let g = func(
        "g",
        vec![],
        vec![try_(
            vec![stmt(yield_value(int(1)))],
            vec![catch(
                &["Exception"],
                Some("e"),
                vec![stmt(yield_value(bin(
                    string("caught "),
                    B::Concat,
                    method_call(var("e"), "getMessage", vec![]),
                )))],
            )],
            None,
        )],
    );
    let out = output(vec![
        g,
        set("gen", call("g", vec![])),
        stmt(method_call(var("gen"), "current", vec![])),
        line(method_call(var("gen"), "throw", vec![new_object("Exception", vec![string("x")])])),
    ]);
    assert_eq!(out, "caught x\n");
}

#[test]
fn uncaught_exception_inside_a_generator_reaches_the_consumer() {
    let g = func(
        "g",
        vec![],
        vec![stmt(yield_value(int(1))), throw(new_object("RuntimeException", vec![string("broken")]))],
    );
    let out = output(vec![
        g,
        try_(
            vec![foreach(call("g", vec![]), None, var("v"), vec![echo(var("v"))])],
            vec![catch(&["RuntimeException"], Some("e"), vec![echo(method_call(var("e"), "getMessage", vec![]))])],
            None,
        ),
    ]);
    assert_eq!(out, "1broken");
}

#[test]
fn generators_are_generator_objects() {
    let out = output(vec![
        one_two(),
        set("g", call("one_two", vec![])),
        line(call("get_class", vec![var("g")])),
        line(ternary(instance_of(var("g"), "Traversable"), Some(string("yes")), string("no"))),
    ]);
    assert_eq!(out, "Generator\nyes\n");
}

#[test]
fn iterator_to_array_drains_a_generator() {
    let out = output(vec![
        one_two(),
        set("all", call("iterator_to_array", vec![call("one_two", vec![])])),
        line(call("count", vec![var("all")])),
        line(index(var("all"), int(1))),
    ]);
    assert_eq!(out, "2\n2\n");
}
