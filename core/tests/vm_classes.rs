mod common;

use phpvm_core::ast::build::*;
use phpvm_core::ast::{BinaryOperator as B, ClassKind, Param, PropertyDecl, Visibility};
use phpvm_core::{compile, AstNode, RuntimeOptions, VM};

use common::{output, run, uncaught_class};

fn line(e: AstNode) -> AstNode {
    echo_all(vec![e, string("\n")])
}

fn this_prop(name: &str) -> AstNode {
    prop(this(), name)
}

fn private(p: PropertyDecl) -> PropertyDecl {
    PropertyDecl { visibility: Visibility::Private, ..p }
}

/// Load `body` and return the declaration error it must produce.
fn load_error(body: Vec<AstNode>) -> String {
    let unit = compile(&script(body), "test.php").expect("compile");
    let mut vm = VM::with_options(RuntimeOptions::default()).expect("vm");
    match vm.load(&unit) {
        Ok(()) => panic!("expected the unit to be rejected"),
        Err(e) => e.to_string(),
    }
}

fn animals() -> Vec<AstNode> {
    let mut animal = class_decl("Animal");
    animal.properties.push(PropertyDecl { visibility: Visibility::Protected, ..property("name", None) });
    animal.methods.push(method("__construct", vec![param("name")], vec![assign(this_prop("name"), var("name"))]));
    animal.methods.push(method("speak", vec![], vec![ret(bin(this_prop("name"), B::Concat, string(" makes a sound")))]));
    let mut dog = class_decl("Dog");
    dog.parent = Some("Animal".into());
    dog.methods.push(method(
        "speak",
        vec![],
        vec![ret(bin(static_call("parent", "speak", vec![]), B::Concat, string(" (woof)")))],
    ));
    vec![class(animal), class(dog)]
}

#[test]
fn inheritance_overrides_and_parent_calls() {
    let mut body = animals();
    body.extend([
        line(method_call(new_object("Animal", vec![string("Generic")]), "speak", vec![])),
        line(method_call(new_object("Dog", vec![string("Rex")]), "speak", vec![])),
        set("d", new_object("Dog", vec![string("Rex")])),
        line(ternary(instance_of(var("d"), "Animal"), Some(string("is animal")), string("not animal"))),
        line(call("get_class", vec![var("d")])),
    ]);
    assert_eq!(output(body), "Generic makes a sound\nRex makes a sound (woof)\nis animal\nDog\n");
}

#[test]
fn classes_declared_after_use_are_hoisted() {
    let mut body = vec![line(method_call(new_object("Dog", vec![string("Early")]), "speak", vec![]))];
    body.extend(animals());
    assert_eq!(output(body), "Early makes a sound (woof)\n");
}

#[test]
fn interfaces_and_abstract_classes() {
    let mut shape = class_decl("Shape");
    shape.kind = ClassKind::Interface;
    shape.methods.push(method("area", vec![], vec![]));
    let mut base = class_decl("Base");
    base.is_abstract = true;
    base.interfaces.push("Shape".into());
    base.methods.push(method("describe", vec![], vec![ret(bin(string("area="), B::Concat, method_call(this(), "area", vec![])))]));
    let mut square = class_decl("Square");
    square.parent = Some("Base".into());
    square.methods.push(method("area", vec![], vec![ret(int(9))]));
    let body = vec![
        class(shape.clone()),
        class(base.clone()),
        class(square.clone()),
        set("s", new_object("Square", vec![])),
        line(method_call(var("s"), "describe", vec![])),
        line(ternary(instance_of(var("s"), "Shape"), Some(string("shape")), string("?"))),
    ];
    assert_eq!(output(body), "area=9\nshape\n");

    let (_, summary) = run(vec![class(shape), class(base), class(square), stmt(new_object("Base", vec![]))]);
    match &summary.failure {
        Some(phpvm_core::vm::Failure::Uncaught { class, message }) => {
            assert_eq!(class, "Error");
            assert_eq!(message, "Cannot instantiate abstract class Base");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn missing_interface_methods_are_rejected() {
    let mut shape = class_decl("Shape");
    shape.kind = ClassKind::Interface;
    shape.methods.push(method("area", vec![], vec![]));
    let mut blob = class_decl("Blob");
    blob.interfaces.push("Shape".into());
    let err = load_error(vec![class(shape), class(blob)]);
    assert!(err.contains("Class Blob contains 1 abstract method"), "{}", err);
    assert!(err.contains("Shape::area"), "{}", err);
}

#[test]
fn extending_a_final_class_is_rejected() {
    let mut sealed = class_decl("Sealed");
    sealed.is_final = true;
    let mut child = class_decl("Child");
    child.parent = Some("Sealed".into());
    let err = load_error(vec![class(sealed), class(child)]);
    assert_eq!(err, "Class Child cannot extend final class Sealed");
}

#[test]
fn static_members_and_late_static_binding() {
    let mut counter = class_decl("Counter");
    counter.properties.push(static_property("count", Some(int(0))));
    counter.methods.push(static_method(
        "inc",
        vec![],
        vec![stmt(post_inc(static_prop("self", "count"))), ret(static_prop("self", "count"))],
    ));
    let mut model = class_decl("Model");
    model.methods.push(static_method("create", vec![], vec![ret(new_object("static", vec![]))]));
    model.methods.push(static_method("label", vec![], vec![ret(class_const("static", "class"))]));
    let mut user = class_decl("User");
    user.parent = Some("Model".into());
    let out = output(vec![
        class(counter),
        class(model),
        class(user),
        stmt(static_call("Counter", "inc", vec![])),
        stmt(static_call("Counter", "inc", vec![])),
        line(static_prop("Counter", "count")),
        line(call("get_class", vec![static_call("User", "create", vec![])])),
        line(call("get_class", vec![static_call("Model", "create", vec![])])),
        line(static_call("User", "label", vec![])),
    ]);
    assert_eq!(out, "2\nUser\nModel\nUser\n");
}

#[test]
fn class_constants_reference_each_other() {
    let mut cfg = class_decl("Config");
    cfg.constants.push(class_constant("BASE", int(2)));
    cfg.constants.push(class_constant("DOUBLE", bin(class_const("self", "BASE"), B::Mul, int(2))));
    let mut child = class_decl("Override");
    child.parent = Some("Config".into());
    child.constants.push(class_constant("BASE", int(5)));
    let out = output(vec![
        class(cfg),
        class(child),
        line(class_const("Config", "DOUBLE")),
        line(class_const("Override", "BASE")),
        line(class_const("Override", "DOUBLE")),
        line(class_const("Override", "class")),
    ]);
    assert_eq!(out, "4\n5\n4\nOverride\n");
}

#[test]
fn private_members_are_hidden_from_outside() {
    let mut secret = class_decl("Secret");
    secret.properties.push(private(property("value", Some(int(42)))));
    secret.methods.push(method("reveal", vec![], vec![ret(this_prop("value"))]));
    let mut hidden = method("hidden", vec![], vec![ret(int(1))]);
    hidden.visibility = Visibility::Private;
    secret.methods.push(hidden);

    let out = output(vec![class(secret.clone()), line(method_call(new_object("Secret", vec![]), "reveal", vec![]))]);
    assert_eq!(out, "42\n");

    let (_, summary) = run(vec![class(secret.clone()), echo(prop(new_object("Secret", vec![]), "value"))]);
    match &summary.failure {
        Some(phpvm_core::vm::Failure::Uncaught { message, .. }) => {
            assert_eq!(message, "Cannot access private property Secret::$value")
        }
        other => panic!("{:?}", other),
    }

    let (_, summary) = run(vec![class(secret), stmt(method_call(new_object("Secret", vec![]), "hidden", vec![]))]);
    match &summary.failure {
        Some(phpvm_core::vm::Failure::Uncaught { message, .. }) => {
            assert_eq!(message, "Call to private method Secret::hidden() from global scope")
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn constructor_promotion() {
    let promoted = |name: &str| Param { promote: Some(Visibility::Public), ..param_default(name, int(0)) };
    let mut point = class_decl("Point");
    point.methods.push(method("__construct", vec![promoted("x"), promoted("y")], vec![]));
    let out = output(vec![
        class(point),
        set("p", new_object("Point", vec![int(3)])),
        line(bin(prop(var("p"), "x"), B::Concat, bin(string(","), B::Concat, prop(var("p"), "y")))),
    ]);
    assert_eq!(out, "3,0\n");
}

#[test]
fn objects_are_handles_and_clone_copies() {
    let mut bag = class_decl("Box_");
    bag.properties.push(property("v", Some(int(1))));
    bag.methods.push(method("__clone", vec![], vec![assign(this_prop("v"), bin(this_prop("v"), B::Mul, int(10)))]));
    let out = output(vec![
        class(bag),
        set("a", new_object("Box_", vec![])),
        set("b", var("a")),
        assign(prop(var("b"), "v"), int(5)),
        line(prop(var("a"), "v")),
        set("c", clone(var("a"))),
        assign(prop(var("a"), "v"), int(7)),
        line(prop(var("c"), "v")),
        line(ternary(bin(var("a"), B::Identical, var("b")), Some(string("same")), string("different"))),
        line(ternary(bin(var("a"), B::Identical, var("c")), Some(string("same")), string("different"))),
    ]);
    assert_eq!(out, "5\n50\nsame\ndifferent\n");
}

#[test]
fn magic_property_access() {
    let mut bag = class_decl("Bag");
    bag.properties.push(private(property("data", Some(array(vec![])))));
    bag.methods.push(method(
        "__get",
        vec![param("n")],
        vec![ret(bin(index(this_prop("data"), var("n")), B::Coalesce, string("none")))],
    ));
    bag.methods.push(method(
        "__set",
        vec![param("n"), param("v")],
        vec![assign(index(this_prop("data"), var("n")), var("v"))],
    ));
    bag.methods.push(method("__isset", vec![param("n")], vec![ret(isset(vec![index(this_prop("data"), var("n"))]))]));
    let out = output(vec![
        class(bag),
        set("b", new_object("Bag", vec![])),
        assign(prop(var("b"), "color"), string("red")),
        line(prop(var("b"), "color")),
        line(prop(var("b"), "size")),
        line(ternary(isset(vec![prop(var("b"), "color")]), Some(string("set")), string("unset"))),
        line(ternary(isset(vec![prop(var("b"), "size")]), Some(string("set")), string("unset"))),
    ]);
    assert_eq!(out, "red\nnone\nset\nunset\n");
}

#[test]
fn magic_calls_strings_and_invocation() {
    let mut proxy = class_decl("Proxy");
    proxy.methods.push(method(
        "__call",
        vec![param("name"), param("args")],
        vec![ret(bin(var("name"), B::Concat, bin(string(":"), B::Concat, call("count", vec![var("args")]))))],
    ));
    proxy.methods.push(static_method("__callStatic", vec![param("name"), param("args")], vec![ret(bin(string("static "), B::Concat, var("name")))]));
    proxy.methods.push(method("__toString", vec![], vec![ret(string("<proxy>"))]));
    proxy.methods.push(method("__invoke", vec![param("x")], vec![ret(bin(var("x"), B::Mul, int(2)))]));
    let out = output(vec![
        class(proxy),
        set("p", new_object("Proxy", vec![])),
        line(method_call(var("p"), "anything", vec![int(1), int(2)])),
        line(static_call("Proxy", "build", vec![])),
        line(bin(string("as string: "), B::Concat, var("p"))),
        line(call_value(var("p"), vec![int(21)])),
        line(ternary(call("is_callable", vec![var("p")]), Some(string("callable")), string("not callable"))),
    ]);
    assert_eq!(out, "anything:2\nstatic build\nas string: <proxy>\n42\ncallable\n");
}

#[test]
fn traits_are_copied_into_the_class() {
    let mut greets = class_decl("Greets");
    greets.kind = ClassKind::Trait;
    greets.properties.push(property("greeting", Some(string("hi"))));
    greets.methods.push(method("hello", vec![], vec![ret(bin(this_prop("greeting"), B::Concat, bin(string(" "), B::Concat, this_prop("name"))))]));
    let mut person = class_decl("Person");
    person.traits.push("Greets".into());
    person.properties.push(property("name", Some(string("ana"))));
    let out = output(vec![class(greets), class(person), line(method_call(new_object("Person", vec![]), "hello", vec![]))]);
    assert_eq!(out, "hi ana\n");
}

#[test]
fn undefined_methods_and_classes() {
    let (_, summary) = run(vec![class(class_decl("Empty")), stmt(method_call(new_object("Empty", vec![]), "go", vec![]))]);
    match &summary.failure {
        Some(phpvm_core::vm::Failure::Uncaught { message, .. }) => assert_eq!(message, "Call to undefined method Empty::go()"),
        other => panic!("{:?}", other),
    }
    let (_, summary) = run(vec![stmt(new_object("Missing", vec![]))]);
    assert_eq!(uncaught_class(&summary), "Error");
}

#[test]
fn nullsafe_access_short_circuits_on_null() {
    let out = output(vec![
        set("nothing", null()),
        line(call("gettype", vec![nullsafe_method_call(var("nothing"), "go", vec![])])),
        line(call("gettype", vec![nullsafe_prop(var("nothing"), "field")])),
    ]);
    assert_eq!(out, "NULL\nNULL\n");
}

#[test]
fn methods_and_properties_of_this_inside_closures() {
    let mut holder = class_decl("Holder");
    holder.properties.push(property("base", Some(int(10))));
    holder.methods.push(method(
        "adder",
        vec![],
        vec![ret(closure(vec![param("n")], vec![], vec![ret(bin(this_prop("base"), B::Add, var("n")))]))],
    ));
    let out = output(vec![
        class(holder),
        set("add", method_call(new_object("Holder", vec![]), "adder", vec![])),
        line(call_value(var("add"), vec![int(5)])),
    ]);
    assert_eq!(out, "15\n");
}

#[test]
fn match_uses_strict_comparison() {
    let classify = |v: AstNode| {
        line(match_(
            v,
            vec![
                (Some(vec![int(1), int(2)]), string("small")),
                (Some(vec![string("1")]), string("string one")),
                (None, string("other")),
            ],
        ))
    };
    let out = output(vec![classify(int(2)), classify(string("1")), classify(float(1.0))]);
    assert_eq!(out, "small\nstring one\nother\n");
}

#[test]
fn switch_uses_loose_comparison_and_falls_through() {
    let out = output(vec![switch(
        string("2"),
        vec![
            (Some(int(1)), vec![echo(string("one "))]),
            (Some(int(2)), vec![echo(string("two "))]),
            (Some(int(3)), vec![echo(string("three ")), break_(1)]),
            (None, vec![echo(string("default"))]),
        ],
    )]);
    assert_eq!(out, "two three ");
}

#[test]
fn user_iterators_drive_foreach() {
    let mut countdown = class_decl("Countdown");
    countdown.interfaces.push("Iterator".into());
    countdown.properties.push(private(property("n", Some(int(0)))));
    countdown.methods.push(method("current", vec![], vec![ret(this_prop("n"))]));
    countdown.methods.push(method("key", vec![], vec![ret(bin(int(3), B::Sub, this_prop("n")))]));
    countdown.methods.push(method("next", vec![], vec![stmt(inc_dec(phpvm_core::ast::IncDecOperator::PreDec, this_prop("n")))]));
    countdown.methods.push(method("rewind", vec![], vec![assign(this_prop("n"), int(3))]));
    countdown.methods.push(method("valid", vec![], vec![ret(bin(this_prop("n"), B::Gt, int(0)))]));
    let out = output(vec![
        class(countdown),
        foreach(
            new_object("Countdown", vec![]),
            Some(var("k")),
            var("v"),
            vec![echo_all(vec![var("k"), string(":"), var("v"), string(" ")])],
        ),
    ]);
    assert_eq!(out, "0:3 1:2 2:1 ");
}
