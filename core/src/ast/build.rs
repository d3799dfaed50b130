//! Terse constructors for hosts and tests that assemble trees by hand.

use super::kind::*;
use super::node::AstNode;

pub fn node(kind: AstNodeKind) -> AstNode {
    AstNode::new(kind, None, None)
}

fn bx(n: AstNode) -> Box<AstNode> {
    Box::new(n)
}

pub fn script(body: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Script { body })
}
pub fn block(statements: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Block { statements })
}
pub fn stmt(expr: AstNode) -> AstNode {
    node(AstNodeKind::ExprStmt { expr: bx(expr) })
}
pub fn echo(expr: AstNode) -> AstNode {
    node(AstNodeKind::Echo { args: vec![expr] })
}
pub fn echo_all(args: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Echo { args })
}

pub fn var(name: &str) -> AstNode {
    node(AstNodeKind::Variable { name: name.to_string() })
}
pub fn var_var(name: AstNode) -> AstNode {
    node(AstNodeKind::VariableVariable { name: bx(name) })
}
pub fn int(value: i64) -> AstNode {
    node(AstNodeKind::Integer { value })
}
pub fn float(value: f64) -> AstNode {
    node(AstNodeKind::Float { value })
}
pub fn string(value: &str) -> AstNode {
    node(AstNodeKind::String { value: value.to_string() })
}
pub fn boolean(value: bool) -> AstNode {
    node(AstNodeKind::Bool { value })
}
pub fn null() -> AstNode {
    node(AstNodeKind::Null)
}
pub fn name(name: &str) -> AstNode {
    node(AstNodeKind::Name { name: name.to_string() })
}
pub fn interp(parts: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Interpolated { parts })
}
pub fn magic(magic: MagicConstKind) -> AstNode {
    node(AstNodeKind::MagicConst { magic })
}

pub fn assign(target: AstNode, value: AstNode) -> AstNode {
    node(AstNodeKind::Assign { target: bx(target), value: bx(value) })
}
/// `$name = value;` as a statement.
pub fn set(name: &str, value: AstNode) -> AstNode {
    stmt(assign(var(name), value))
}
pub fn assign_ref(target: AstNode, value: AstNode) -> AstNode {
    node(AstNodeKind::AssignRef { target: bx(target), value: bx(value) })
}
pub fn compound(op: BinaryOperator, target: AstNode, value: AstNode) -> AstNode {
    node(AstNodeKind::CompoundAssign { op, target: bx(target), value: bx(value) })
}
pub fn bin(left: AstNode, op: BinaryOperator, right: AstNode) -> AstNode {
    node(AstNodeKind::BinaryOp { left: bx(left), op, right: bx(right) })
}
pub fn unary(op: UnaryOperator, expr: AstNode) -> AstNode {
    node(AstNodeKind::UnaryOp { op, expr: bx(expr) })
}
pub fn inc_dec(op: IncDecOperator, target: AstNode) -> AstNode {
    node(AstNodeKind::IncDec { op, target: bx(target) })
}
pub fn post_inc(target: AstNode) -> AstNode {
    inc_dec(IncDecOperator::PostInc, target)
}
pub fn pre_inc(target: AstNode) -> AstNode {
    inc_dec(IncDecOperator::PreInc, target)
}
pub fn ternary(condition: AstNode, then: Option<AstNode>, otherwise: AstNode) -> AstNode {
    node(AstNodeKind::Ternary { condition: bx(condition), then: then.map(bx), otherwise: bx(otherwise) })
}
pub fn cast(cast: CastKind, expr: AstNode) -> AstNode {
    node(AstNodeKind::Cast { cast, expr: bx(expr) })
}
pub fn isset(targets: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Isset { targets })
}
pub fn empty(expr: AstNode) -> AstNode {
    node(AstNodeKind::Empty { expr: bx(expr) })
}
pub fn instance_of(expr: AstNode, class: &str) -> AstNode {
    node(AstNodeKind::Instanceof { expr: bx(expr), class: bx(name(class)) })
}
pub fn clone(expr: AstNode) -> AstNode {
    node(AstNodeKind::Clone { expr: bx(expr) })
}

pub fn arg(value: AstNode) -> Argument {
    Argument { value, unpack: false, name: None }
}
pub fn named_arg(name: &str, value: AstNode) -> Argument {
    Argument { value, unpack: false, name: Some(name.to_string()) }
}
pub fn spread_arg(value: AstNode) -> Argument {
    Argument { value, unpack: true, name: None }
}
fn args(values: Vec<AstNode>) -> Vec<Argument> {
    values.into_iter().map(arg).collect()
}

pub fn call(func: &str, values: Vec<AstNode>) -> AstNode {
    call_with(func, args(values))
}
pub fn call_with(func: &str, args: Vec<Argument>) -> AstNode {
    node(AstNodeKind::Call { callee: bx(name(func)), args })
}
pub fn call_value(callee: AstNode, values: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Call { callee: bx(callee), args: args(values) })
}
pub fn method_call(object: AstNode, method: &str, values: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::MethodCall {
        object: bx(object),
        method: bx(name(method)),
        args: args(values),
        nullsafe: false,
    })
}
pub fn nullsafe_method_call(object: AstNode, method: &str, values: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::MethodCall {
        object: bx(object),
        method: bx(name(method)),
        args: args(values),
        nullsafe: true,
    })
}
pub fn static_call(class: &str, method: &str, values: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::StaticCall { class: bx(name(class)), method: method.to_string(), args: args(values) })
}
pub fn prop(object: AstNode, property: &str) -> AstNode {
    node(AstNodeKind::PropertyFetch { object: bx(object), property: bx(name(property)), nullsafe: false })
}
pub fn nullsafe_prop(object: AstNode, property: &str) -> AstNode {
    node(AstNodeKind::PropertyFetch { object: bx(object), property: bx(name(property)), nullsafe: true })
}
pub fn static_prop(class: &str, property: &str) -> AstNode {
    node(AstNodeKind::StaticPropertyFetch { class: bx(name(class)), property: property.to_string() })
}
pub fn class_const(class: &str, constant: &str) -> AstNode {
    node(AstNodeKind::ClassConstFetch { class: bx(name(class)), name: constant.to_string() })
}
pub fn new_object(class: &str, values: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::New { class: bx(name(class)), args: args(values) })
}
pub fn this() -> AstNode {
    var("this")
}

pub fn index(base: AstNode, idx: AstNode) -> AstNode {
    node(AstNodeKind::Index { base: bx(base), index: Some(bx(idx)) })
}
pub fn append(base: AstNode) -> AstNode {
    node(AstNodeKind::Index { base: bx(base), index: None })
}
pub fn array(values: Vec<AstNode>) -> AstNode {
    let items = values
        .into_iter()
        .map(|value| ArrayItem { key: None, value, by_ref: false, unpack: false })
        .collect();
    node(AstNodeKind::ArrayLiteral { items })
}
pub fn array_kv(pairs: Vec<(AstNode, AstNode)>) -> AstNode {
    let items = pairs
        .into_iter()
        .map(|(key, value)| ArrayItem { key: Some(key), value, by_ref: false, unpack: false })
        .collect();
    node(AstNodeKind::ArrayLiteral { items })
}
pub fn list(targets: Vec<AstNode>) -> AstNode {
    let items = targets
        .into_iter()
        .map(|value| Some(ArrayItem { key: None, value, by_ref: false, unpack: false }))
        .collect();
    node(AstNodeKind::List { items })
}

pub fn ret(value: AstNode) -> AstNode {
    node(AstNodeKind::Return { value: Some(bx(value)) })
}
pub fn ret_void() -> AstNode {
    node(AstNodeKind::Return { value: None })
}
pub fn if_(condition: AstNode, then: Vec<AstNode>, otherwise: Option<Vec<AstNode>>) -> AstNode {
    node(AstNodeKind::If {
        condition: bx(condition),
        then_branch: bx(block(then)),
        else_branch: otherwise.map(|b| bx(block(b))),
    })
}
pub fn while_(condition: AstNode, body: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::While { condition: bx(condition), body: bx(block(body)) })
}
pub fn do_while(body: Vec<AstNode>, condition: AstNode) -> AstNode {
    node(AstNodeKind::DoWhile { body: bx(block(body)), condition: bx(condition) })
}
pub fn for_(init: Vec<AstNode>, condition: Vec<AstNode>, step: Vec<AstNode>, body: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::For { init, condition, step, body: bx(block(body)) })
}
pub fn foreach(subject: AstNode, key: Option<AstNode>, value: AstNode, body: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Foreach {
        subject: bx(subject),
        key: key.map(bx),
        value: bx(value),
        by_ref: false,
        body: bx(block(body)),
    })
}
pub fn foreach_ref(subject: AstNode, value: AstNode, body: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Foreach {
        subject: bx(subject),
        key: None,
        value: bx(value),
        by_ref: true,
        body: bx(block(body)),
    })
}
pub fn break_(depth: u32) -> AstNode {
    node(AstNodeKind::Break { depth })
}
pub fn continue_(depth: u32) -> AstNode {
    node(AstNodeKind::Continue { depth })
}
pub fn switch(subject: AstNode, cases: Vec<(Option<AstNode>, Vec<AstNode>)>) -> AstNode {
    let cases = cases.into_iter().map(|(test, body)| SwitchCase { test, body }).collect();
    node(AstNodeKind::Switch { subject: bx(subject), cases })
}
pub fn match_(subject: AstNode, arms: Vec<(Option<Vec<AstNode>>, AstNode)>) -> AstNode {
    let arms = arms.into_iter().map(|(conditions, body)| MatchArm { conditions, body }).collect();
    node(AstNodeKind::Match { subject: bx(subject), arms })
}
pub fn global(names: &[&str]) -> AstNode {
    node(AstNodeKind::Global { names: names.iter().map(|n| n.to_string()).collect() })
}
pub fn static_var(name: &str, default: Option<AstNode>) -> AstNode {
    node(AstNodeKind::StaticVar { vars: vec![StaticVarItem { name: name.to_string(), default }] })
}
pub fn unset(targets: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Unset { targets })
}
pub fn const_decl(name: &str, value: AstNode) -> AstNode {
    node(AstNodeKind::ConstDecl { name: name.to_string(), value: bx(value) })
}

pub fn param(name: &str) -> Param {
    Param { name: name.to_string(), type_hint: None, default: None, by_ref: false, variadic: false, promote: None }
}
pub fn param_default(name: &str, default: AstNode) -> Param {
    Param { default: Some(bx(default)), ..param(name) }
}
pub fn param_ref(name: &str) -> Param {
    Param { by_ref: true, ..param(name) }
}
pub fn param_variadic(name: &str) -> Param {
    Param { variadic: true, ..param(name) }
}
pub fn param_typed(name: &str, type_name: &str) -> Param {
    let nullable = type_name.starts_with('?');
    let names = type_name.trim_start_matches('?').split('|').map(|s| s.to_string()).collect();
    Param { type_hint: Some(TypeName { names, nullable }), ..param(name) }
}

pub fn function(name: &str, params: Vec<Param>, body: Vec<AstNode>) -> FunctionDecl {
    FunctionDecl { name: name.to_string(), params, body, by_ref_return: false, return_type: None }
}
pub fn func(name: &str, params: Vec<Param>, body: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::FunctionDecl(function(name, params, body)))
}
pub fn closure(params: Vec<Param>, uses: Vec<ClosureUse>, body: Vec<AstNode>) -> AstNode {
    node(AstNodeKind::Closure { params, uses, body, by_ref_return: false, is_static: false })
}
pub fn use_var(name: &str) -> ClosureUse {
    ClosureUse { name: name.to_string(), by_ref: false }
}
pub fn use_ref(name: &str) -> ClosureUse {
    ClosureUse { name: name.to_string(), by_ref: true }
}
pub fn arrow_fn(params: Vec<Param>, body: AstNode) -> AstNode {
    node(AstNodeKind::ArrowFn { params, body: bx(body), is_static: false })
}

pub fn class(decl: ClassDecl) -> AstNode {
    node(AstNodeKind::ClassDecl(decl))
}
pub fn class_decl(name: &str) -> ClassDecl {
    ClassDecl { name: name.to_string(), ..ClassDecl::default() }
}
pub fn method(name: &str, params: Vec<Param>, body: Vec<AstNode>) -> MethodDecl {
    MethodDecl {
        func: function(name, params, body),
        visibility: Visibility::Public,
        is_static: false,
        is_abstract: false,
        is_final: false,
    }
}
pub fn static_method(name: &str, params: Vec<Param>, body: Vec<AstNode>) -> MethodDecl {
    MethodDecl { is_static: true, ..method(name, params, body) }
}
pub fn property(name: &str, default: Option<AstNode>) -> PropertyDecl {
    PropertyDecl { name: name.to_string(), default, visibility: Visibility::Public, is_static: false, type_hint: None }
}
pub fn static_property(name: &str, default: Option<AstNode>) -> PropertyDecl {
    PropertyDecl { is_static: true, ..property(name, default) }
}
pub fn class_constant(name: &str, value: AstNode) -> ClassConstDecl {
    ClassConstDecl { name: name.to_string(), value, visibility: Visibility::Public }
}

pub fn try_(body: Vec<AstNode>, catches: Vec<CatchClause>, finally: Option<Vec<AstNode>>) -> AstNode {
    node(AstNodeKind::Try { body: bx(block(body)), catches, finally: finally.map(|b| bx(block(b))) })
}
pub fn catch(types: &[&str], var: Option<&str>, body: Vec<AstNode>) -> CatchClause {
    CatchClause {
        types: types.iter().map(|t| t.to_string()).collect(),
        var: var.map(|v| v.to_string()),
        body: bx(block(body)),
    }
}
pub fn throw(expr: AstNode) -> AstNode {
    stmt(node(AstNodeKind::Throw { expr: bx(expr) }))
}

pub fn yield_value(value: AstNode) -> AstNode {
    node(AstNodeKind::Yield { key: None, value: Some(bx(value)) })
}
pub fn yield_pair(key: AstNode, value: AstNode) -> AstNode {
    node(AstNodeKind::Yield { key: Some(bx(key)), value: Some(bx(value)) })
}
pub fn yield_from(expr: AstNode) -> AstNode {
    node(AstNodeKind::YieldFrom { expr: bx(expr) })
}
pub fn spawn(call: AstNode) -> AstNode {
    node(AstNodeKind::Spawn { call: bx(call) })
}
pub fn await_(expr: AstNode) -> AstNode {
    node(AstNodeKind::Await { expr: bx(expr) })
}
pub fn exit(value: Option<AstNode>) -> AstNode {
    stmt(node(AstNodeKind::Exit { value: value.map(bx) }))
}
