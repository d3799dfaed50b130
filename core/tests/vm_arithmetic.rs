mod common;

use phpvm_core::ast::build::*;
use phpvm_core::ast::{BinaryOperator as B, CastKind, UnaryOperator};
use phpvm_core::vm::Value;

use common::{global, global_int, output, run, uncaught_class};

fn echo_line(expr: phpvm_core::AstNode) -> phpvm_core::AstNode {
    echo_all(vec![expr, string("\n")])
}

#[test]
fn precedence_is_carried_by_the_tree() {
    let (_, summary) = run(vec![set("x", bin(int(1), B::Add, bin(int(2), B::Mul, int(3))))]);
    assert!(summary.failure.is_none());
    assert_eq!(global_int(&summary, "x"), 7);
}

#[test]
fn integer_arithmetic_stays_exact() {
    let out = output(vec![
        echo_line(bin(int(2), B::Add, int(3))),
        echo_line(bin(int(7), B::Sub, int(10))),
        echo_line(bin(int(6), B::Mul, int(7))),
        echo_line(bin(int(6), B::Div, int(3))),
        echo_line(bin(int(7), B::Div, int(2))),
        echo_line(bin(int(-7), B::Mod, int(3))),
        echo_line(bin(int(2), B::Pow, int(10))),
        echo_line(bin(int(6), B::BitAnd, int(3))),
        echo_line(bin(int(1), B::Shl, int(4))),
        echo_line(bin(int(-16), B::Shr, int(2))),
    ]);
    assert_eq!(out, "5\n-3\n42\n2\n3.5\n-1\n1024\n2\n16\n-4\n");
}

#[test]
fn overflow_promotes_to_float() {
    let (out, summary) = run(vec![
        set("a", bin(name("PHP_INT_MAX"), B::Add, int(1))),
        set("b", bin(name("PHP_INT_MIN"), B::Sub, int(1))),
        set("c", bin(name("PHP_INT_MAX"), B::Mul, int(2))),
        set("d", bin(int(2), B::Pow, int(63))),
        set("e", unary(UnaryOperator::Minus, name("PHP_INT_MIN"))),
        echo_line(var("a")),
        echo_line(var("c")),
    ]);
    assert!(summary.failure.is_none(), "{}", out);
    let expect = |name: &str, want: f64| match global(&summary, name) {
        Value::Float(f) => assert_eq!(f, want, "${}", name),
        other => panic!("${} should be a float, got {:?}", name, other),
    };
    expect("a", i64::MAX as f64 + 1.0);
    expect("b", i64::MIN as f64 - 1.0);
    expect("c", i64::MAX as f64 * 2.0);
    expect("d", 2f64.powi(63));
    expect("e", -(i64::MIN as f64));
    assert_eq!(out, "9.2233720368548E+18\n1.844674407371E+19\n");
}

#[test]
fn float_operands_follow_native_arithmetic() {
    let (_, summary) = run(vec![
        set("a", bin(float(0.1), B::Add, float(0.2))),
        set("b", bin(int(1), B::Div, int(3))),
        set("c", bin(float(1.5), B::Mul, int(4))),
    ]);
    match global(&summary, "a") {
        Value::Float(f) => assert_eq!(f, 0.1 + 0.2),
        other => panic!("{:?}", other),
    }
    match global(&summary, "b") {
        Value::Float(f) => assert_eq!(f, 1.0 / 3.0),
        other => panic!("{:?}", other),
    }
    match global(&summary, "c") {
        Value::Float(f) => assert_eq!(f, 6.0),
        other => panic!("{:?}", other),
    }
}

#[test]
fn floats_print_with_fourteen_significant_digits() {
    let out = output(vec![
        echo_line(bin(float(0.1), B::Add, float(0.2))),
        echo_line(float(1e25)),
        echo_line(float(-0.00001)),
        echo_line(float(2.0)),
        echo_line(bin(int(1), B::Div, int(3))),
    ]);
    assert_eq!(out, "0.3\n1.0E+25\n-1.0E-5\n2\n0.33333333333333\n");
}

#[test]
fn division_by_zero_throws() {
    let (_, summary) = run(vec![echo(bin(int(1), B::Div, int(0)))]);
    assert_eq!(uncaught_class(&summary), "DivisionByZeroError");
    assert_eq!(summary.exit_code, 255);

    let (_, summary) = run(vec![echo(bin(int(1), B::Mod, int(0)))]);
    assert_eq!(uncaught_class(&summary), "DivisionByZeroError");

    let (_, summary) = run(vec![echo(call("intdiv", vec![name("PHP_INT_MIN"), int(-1)]))]);
    assert_eq!(uncaught_class(&summary), "ArithmeticError");
}

#[test]
fn negative_shift_is_an_arithmetic_error() {
    let (_, summary) = run(vec![echo(bin(int(1), B::Shl, int(-1)))]);
    assert_eq!(uncaught_class(&summary), "ArithmeticError");
}

#[test]
fn numeric_strings_take_part_in_arithmetic() {
    let out = output(vec![
        echo_line(bin(string("10"), B::Add, int(5))),
        echo_line(bin(string(" 2.5"), B::Mul, int(2))),
        echo_line(bin(string("3 apples"), B::Add, int(1))),
        echo_line(bin(string("7"), B::Concat, int(8))),
    ]);
    assert_eq!(out, "15\n5\n4\n78\n");
}

#[test]
fn non_numeric_string_is_a_type_error() {
    let (_, summary) = run(vec![echo(bin(string("abc"), B::Add, int(1)))]);
    assert_eq!(uncaught_class(&summary), "TypeError");
    let (_, summary) = run(vec![echo(bin(array(vec![int(1)]), B::Add, int(1)))]);
    assert_eq!(uncaught_class(&summary), "TypeError");
}

#[test]
fn increments_cover_ints_nulls_and_strings() {
    let (_, summary) = run(vec![
        set("i", name("PHP_INT_MAX")),
        stmt(post_inc(var("i"))),
        set("n", null()),
        stmt(pre_inc(var("n"))),
        set("s", string("Az")),
        stmt(post_inc(var("s"))),
        set("z", string("zz")),
        stmt(pre_inc(var("z"))),
    ]);
    assert!(matches!(global(&summary, "i"), Value::Float(_)));
    assert_eq!(global_int(&summary, "n"), 1);
    match global(&summary, "s") {
        Value::String(s) => assert_eq!(s.to_string_lossy(), "Ba"),
        other => panic!("{:?}", other),
    }
    match global(&summary, "z") {
        Value::String(s) => assert_eq!(s.to_string_lossy(), "aaa"),
        other => panic!("{:?}", other),
    }
}

#[test]
fn loose_and_strict_comparison() {
    let show = |e| echo_line(ternary(e, Some(string("T")), string("F")));
    let out = output(vec![
        show(bin(int(1), B::Eq, string("1"))),
        show(bin(int(0), B::Eq, string("a"))),
        show(bin(string("1e1"), B::Eq, string("10"))),
        show(bin(null(), B::Eq, boolean(false))),
        show(bin(int(1), B::Identical, string("1"))),
        show(bin(string("abc"), B::Lt, string("abd"))),
        show(bin(int(3), B::Gt, int(2))),
        show(bin(int(2), B::Ge, int(3))),
        echo_line(bin(int(1), B::Spaceship, int(2))),
        echo_line(bin(array(vec![int(1), int(2)]), B::Spaceship, array(vec![int(1), int(2)]))),
    ]);
    assert_eq!(out, "T\nF\nT\nT\nF\nT\nT\nF\n-1\n0\n");
}

#[test]
fn casts_convert_between_scalars() {
    let out = output(vec![
        echo_line(cast(CastKind::Int, string("42abc"))),
        echo_line(cast(CastKind::Int, float(3.99))),
        echo_line(cast(CastKind::String, boolean(true))),
        echo_line(cast(CastKind::Float, string("1.5e3"))),
        echo_line(call("gettype", vec![cast(CastKind::Bool, string("0"))])),
        echo_line(call("gettype", vec![cast(CastKind::Array, int(1))])),
    ]);
    assert_eq!(out, "42\n3\n1\n1500\nboolean\narray\n");
}

#[test]
fn short_circuit_operators_skip_the_right_side() {
    let out = output(vec![
        func("side", vec![], vec![echo(string("side ")), ret(boolean(true))]),
        echo_line(ternary(bin(boolean(false), B::And, call("side", vec![])), Some(string("T")), string("F"))),
        echo_line(ternary(bin(boolean(true), B::Or, call("side", vec![])), Some(string("T")), string("F"))),
        echo_line(bin(var("undefined"), B::Coalesce, string("fallback"))),
    ]);
    assert_eq!(out, "F\nT\nfallback\n");
}
