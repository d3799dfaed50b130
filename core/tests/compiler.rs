use phpvm_core::ast::build::*;
use phpvm_core::ast::BinaryOperator as B;
use phpvm_core::ir::op::ALL_OPCODES;
use phpvm_core::ir::{CompileErrorKind, Opcode};
use phpvm_core::vm::is_implemented;
use phpvm_core::{compile, AstNode};

fn sample() -> AstNode {
    let mut greeter = class_decl("Greeter");
    greeter.properties.push(property("name", Some(string("world"))));
    greeter.methods.push(method(
        "greet",
        vec![param_default("greeting", string("hello"))],
        vec![ret(bin(var("greeting"), B::Concat, prop(this(), "name")))],
    ));
    script(vec![
        class(greeter),
        func(
            "count_to",
            vec![param("n")],
            vec![for_(
                vec![assign(var("i"), int(1))],
                vec![bin(var("i"), B::Le, var("n"))],
                vec![post_inc(var("i"))],
                vec![stmt(yield_value(var("i")))],
            )],
        ),
        try_(
            vec![foreach(call("count_to", vec![int(3)]), None, var("v"), vec![echo(var("v"))])],
            vec![catch(&["Exception"], Some("e"), vec![echo(method_call(var("e"), "getMessage", vec![]))])],
            Some(vec![echo(string("\n"))]),
        ),
        echo(method_call(new_object("Greeter", vec![]), "greet", vec![])),
    ])
}

#[test]
fn compilation_is_deterministic() {
    let ast = sample();
    let first = compile(&ast, "sample.php").expect("first compile");
    let second = compile(&ast, "sample.php").expect("second compile");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
}

#[test]
fn every_opcode_has_a_handler() {
    let missing: Vec<&str> = ALL_OPCODES.iter().filter(|op| !is_implemented(**op)).map(|op| op.name()).collect();
    assert!(missing.is_empty(), "opcodes without handlers: {:?}", missing);
}

#[test]
fn opcodes_round_trip_through_their_byte_value() {
    for op in ALL_OPCODES {
        assert_eq!(Opcode::from_u8(*op as u8), Some(*op));
    }
}

#[test]
fn functions_and_classes_are_hoisted_into_the_unit() {
    let unit = compile(&sample(), "sample.php").expect("compile");
    assert_eq!(unit.file, "sample.php");
    assert!(unit.functions.iter().any(|f| f.name == "count_to" && f.flags.generator));
    assert_eq!(unit.classes.len(), 1);
    assert_eq!(unit.classes[0].name, "Greeter");
    assert_eq!(unit.main.try_regions.len(), 1);
    let region = &unit.main.try_regions[0];
    assert!(region.catch_start.is_some());
    assert!(region.finally_start.is_some());
    assert!(region.try_start < region.end);
}

#[test]
fn no_constant_folding() {
    let unit = compile(&script(vec![echo(bin(int(2), B::Add, int(3)))]), "fold.php").expect("compile");
    assert!(unit.main.instructions.iter().any(|i| i.opcode == Opcode::Add));
}

#[test]
fn jumps_stay_inside_the_function() {
    let unit = compile(&sample(), "sample.php").expect("compile");
    let len = unit.main.instructions.len();
    for insn in &unit.main.instructions {
        if insn.opcode == Opcode::Jmp {
            assert!((insn.op1 as usize) <= len, "{} jumps past the end", insn);
        }
    }
    assert_eq!(unit.main.instructions.last().map(|i| i.opcode), Some(Opcode::Return));
}

#[test]
fn compiled_variables_are_named_slots() {
    let unit = compile(&script(vec![set("a", int(1)), set("b", var("a")), set("a", int(2))]), "cv.php").expect("compile");
    assert_eq!(unit.main.cv_names, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(unit.main.cv_index("b"), Some(1));
}

#[test]
fn duplicate_functions_are_rejected() {
    let ast = script(vec![func("twice", vec![], vec![]), func("TWICE", vec![], vec![])]);
    let err = compile(&ast, "dup.php").expect_err("duplicate function");
    assert_eq!(err.kind(), CompileErrorKind::DuplicateDeclaration);
    assert!(err.to_string().contains("Cannot redeclare function TWICE()"), "{}", err);
}

#[test]
fn duplicate_classes_are_rejected() {
    let ast = script(vec![class(class_decl("Thing")), class(class_decl("Thing"))]);
    let err = compile(&ast, "dup.php").expect_err("duplicate class");
    assert_eq!(err.kind(), CompileErrorKind::DuplicateDeclaration);
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let err = compile(&script(vec![break_(1).at_line(4)]), "brk.php").expect_err("stray break");
    assert_eq!(err.kind(), CompileErrorKind::InvalidContext);
    assert!(err.to_string().starts_with("'break' not in the 'loop' or 'switch' context on line 4"), "{}", err);
}

#[test]
fn break_deeper_than_the_loop_nesting_is_rejected() {
    let ast = script(vec![while_(boolean(true), vec![break_(2)])]);
    let err = compile(&ast, "brk.php").expect_err("too deep");
    assert_eq!(err.kind(), CompileErrorKind::InvalidContext);
}

#[test]
fn writes_to_this_are_rejected() {
    let mut c = class_decl("Owner");
    c.methods.push(method("reset", vec![], vec![assign(this(), null())]));
    let err = compile(&script(vec![class(c)]), "this.php").expect_err("assign to $this");
    assert_eq!(err.kind(), CompileErrorKind::InvalidContext);
}

#[test]
fn a_root_that_is_not_a_script_is_malformed() {
    let err = compile(&echo(int(1)), "bad.php").expect_err("not a script");
    assert_eq!(err.kind(), CompileErrorKind::MalformedAst);
}

#[test]
fn array_element_references_are_unsupported() {
    let ast = script(vec![set("a", array(vec![int(1)])), assign_ref(var("r"), index(var("a"), int(0)))]);
    let err = compile(&ast, "ref.php").expect_err("element reference");
    assert_eq!(err.kind(), CompileErrorKind::Unsupported);
}
