mod common;

use phpvm_core::ast::build::*;
use phpvm_core::ast::BinaryOperator as B;
use phpvm_core::AstNode;

use common::{global_int, output, run, uncaught_class};

fn line(e: AstNode) -> AstNode {
    echo_all(vec![e, string("\n")])
}

fn worker(target: &str) -> AstNode {
    closure(
        vec![],
        vec![use_ref(target), use_var("wg")],
        vec![stmt(post_inc(var(target))), stmt(method_call(var("wg"), "done", vec![]))],
    )
}

#[test]
fn disjoint_increments_survive_repeated_launch_and_wait() {
    let (out, summary) = run(vec![
        set("a", int(0)),
        set("b", int(0)),
        for_(
            vec![assign(var("i"), int(0))],
            vec![bin(var("i"), B::Lt, int(1000))],
            vec![post_inc(var("i"))],
            vec![
                set("wg", call("wait_group", vec![int(2)])),
                set("left", worker("a")),
                set("right", worker("b")),
                stmt(spawn(call_value(var("left"), vec![]))),
                stmt(spawn(call_value(var("right"), vec![]))),
                stmt(method_call(var("wg"), "wait", vec![])),
                if_(
                    bin(
                        bin(var("a"), B::NotIdentical, bin(var("i"), B::Add, int(1))),
                        B::Or,
                        bin(var("b"), B::NotIdentical, bin(var("i"), B::Add, int(1))),
                    ),
                    vec![echo(string("lost update")), break_(1)],
                    None,
                ),
            ],
        ),
    ]);
    assert!(summary.failure.is_none(), "{:?}", summary.failure);
    assert_eq!(out, "");
    assert_eq!(global_int(&summary, "a"), 1000);
    assert_eq!(global_int(&summary, "b"), 1000);
}

#[test]
fn await_returns_the_task_result() {
    let work = func("work", vec![param("n")], vec![ret(bin(var("n"), B::Mul, int(2)))]);
    let out = output(vec![
        work,
        set("t", spawn(call("work", vec![int(21)]))),
        line(await_(var("t"))),
        line(method_call(var("t"), "join", vec![])),
        line(ternary(method_call(var("t"), "isDone", vec![]), Some(string("done")), string("running"))),
    ]);
    assert_eq!(out, "42\n42\ndone\n");
}

#[test]
fn await_on_an_array_keeps_keys() {
    let square = func("square", vec![param("n")], vec![ret(bin(var("n"), B::Mul, var("n")))]);
    let out = output(vec![
        square,
        set(
            "tasks",
            array_kv(vec![
                (string("three"), spawn(call("square", vec![int(3)]))),
                (string("four"), spawn(call("square", vec![int(4)]))),
            ]),
        ),
        foreach(await_(var("tasks")), Some(var("k")), var("v"), vec![echo_all(vec![var("k"), string("="), var("v"), string(" ")])]),
    ]);
    assert_eq!(out, "three=9 four=16 ");
}

#[test]
fn task_failures_surface_when_joined() {
    let fails = func("fails", vec![], vec![throw(new_object("RuntimeException", vec![string("task broke")]))]);
    let out = output(vec![
        fails,
        set("t", spawn(call("fails", vec![]))),
        echo(string("launched ")),
        try_(
            vec![stmt(await_(var("t")))],
            vec![catch(&["RuntimeException"], Some("e"), vec![echo(method_call(var("e"), "getMessage", vec![]))])],
            None,
        ),
    ]);
    assert_eq!(out, "launched task broke");
}

#[test]
fn an_unjoined_failing_task_does_not_stop_the_launcher() {
    let fails = func("fails", vec![], vec![throw(new_object("LogicException", vec![string("ignored")]))]);
    let (out, summary) = run(vec![
        fails,
        stmt(spawn(call("fails", vec![]))),
        echo(string("still running")),
    ]);
    assert!(summary.failure.is_none(), "{:?}", summary.failure);
    assert_eq!(summary.exit_code, 0);
    assert_eq!(out, "still running");
}

#[test]
fn uncaught_task_failure_propagates_through_await() {
    let fails = func("fails", vec![], vec![stmt(bin(int(1), B::Div, int(0)))]);
    let (_, summary) = run(vec![fails, stmt(await_(spawn(call("fails", vec![]))))]);
    assert_eq!(uncaught_class(&summary), "DivisionByZeroError");
}

#[test]
fn tasks_do_not_share_globals() {
    let touch = func("touch", vec![], vec![global(&["g"]), set("g", int(99)), ret(var("g"))]);
    let out = output(vec![
        touch,
        set("g", int(1)),
        line(await_(spawn(call("touch", vec![])))),
        line(var("g")),
    ]);
    assert_eq!(out, "99\n1\n");
}

#[test]
fn tasks_write_to_the_shared_output() {
    let speak = func("speak", vec![], vec![echo(string("from task\n"))]);
    let out = output(vec![speak, stmt(await_(spawn(call("speak", vec![])))), echo(string("from main\n"))]);
    assert_eq!(out, "from task\nfrom main\n");
}

#[test]
fn wait_group_counts() {
    let out = output(vec![
        set("wg", call("wait_group", vec![])),
        stmt(method_call(var("wg"), "add", vec![int(3)])),
        stmt(method_call(var("wg"), "done", vec![])),
        line(method_call(var("wg"), "count", vec![])),
        stmt(method_call(var("wg"), "add", vec![])),
        line(method_call(var("wg"), "count", vec![])),
    ]);
    assert_eq!(out, "2\n3\n");
}

#[test]
fn wait_group_rejects_a_negative_counter() {
    let (_, summary) = run(vec![
        set("wg", call("wait_group", vec![int(1)])),
        stmt(method_call(var("wg"), "done", vec![])),
        stmt(method_call(var("wg"), "done", vec![])),
    ]);
    assert_eq!(uncaught_class(&summary), "ValueError");
}

#[test]
fn awaiting_a_non_task_is_a_type_error() {
    let (_, summary) = run(vec![stmt(await_(int(5)))]);
    assert_eq!(uncaught_class(&summary), "TypeError");
}
