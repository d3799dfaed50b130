//! Lowering for calls, object construction, closures and class
//! declarations.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{Argument, AstNode, AstNodeKind, ClassDecl, ClassKind, ClosureUse, Param as AstParam};
use crate::ir::err::CompileError;
use crate::ir::function::{ClassConstant, CompiledClass, CompiledMethod, Initializer, PropertyInfo, TypeHint};
use crate::ir::instruction::{flags, Instruction, Operand};
use crate::ir::op::Opcode;

use super::function_builder::FunctionBuilder;
use super::lower_expr::{lower_class_ref, lower_expr, lower_member_name};
use super::lower_stmt::{lower_function, lower_params, lower_stmt};
use super::lowering_context::{ClassScope, LoweringContext};
use super::{children, emit_implicit_return, invalid, literal_constant, malformed, plain_name};

pub(crate) fn lower_call_args(cx: &mut LoweringContext, fb: &mut FunctionBuilder, args: &[Argument]) -> Result<(), CompileError> {
    let mut seen_named = false;
    for arg in args {
        if arg.unpack {
            let v = lower_expr(cx, fb, &arg.value)?;
            fb.emit(Instruction::new(Opcode::SendUnpack).with_op1(v));
            continue;
        }
        if let Some(name) = &arg.name {
            seen_named = true;
            let v = lower_expr(cx, fb, &arg.value)?;
            let n = fb.string_const(name);
            fb.emit(Instruction::new(Opcode::SendNamed).with_op1(v).with_op2(n));
            continue;
        }
        if seen_named {
            return Err(invalid(&arg.value, "Cannot use positional argument after named argument"));
        }
        match &arg.value.kind {
            // plain variables may bind to by-reference parameters
            AstNodeKind::Variable { name } if name != "this" => {
                let cv = fb.cv(name);
                fb.emit(Instruction::new(Opcode::SendVar).with_op1(cv));
            }
            _ => {
                let v = lower_expr(cx, fb, &arg.value)?;
                fb.emit(Instruction::new(Opcode::SendVal).with_op1(v));
            }
        }
    }
    Ok(())
}

fn finish_call(fb: &mut FunctionBuilder, finish: Opcode) -> Operand {
    let res = fb.alloc_tmp();
    fb.emit(Instruction::new(finish).with_result(res));
    res
}

pub(crate) fn lower_call(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    callee: &AstNode,
    args: &[Argument],
    finish: Opcode,
) -> Result<Operand, CompileError> {
    match &callee.kind {
        AstNodeKind::Name { name } => {
            let n = fb.string_const(plain_name(name));
            fb.emit(Instruction::new(Opcode::InitFcall).with_op2(n).with_ext(args.len() as u32));
        }
        _ => {
            let v = lower_expr(cx, fb, callee)?;
            fb.emit(Instruction::new(Opcode::InitDynamicCall).with_op1(v).with_ext(args.len() as u32));
        }
    }
    lower_call_args(cx, fb, args)?;
    Ok(finish_call(fb, finish))
}

pub(crate) fn lower_method_call(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    object: &AstNode,
    method: &AstNode,
    args: &[Argument],
    nullsafe: bool,
    finish: Opcode,
) -> Result<Operand, CompileError> {
    let obj = lower_expr(cx, fb, object)?;
    let res = fb.alloc_tmp();
    let end = fb.new_label();
    if nullsafe {
        fb.emit_branch(Instruction::new(Opcode::JmpNull).with_op1(obj).with_result(res), end);
    }
    let name = lower_member_name(cx, fb, method)?;
    fb.emit(Instruction::new(Opcode::InitMethodCall).with_op1(obj).with_op2(name).with_ext(args.len() as u32));
    lower_call_args(cx, fb, args)?;
    fb.emit(Instruction::new(finish).with_result(res));
    fb.bind_label(end);
    Ok(res)
}

pub(crate) fn lower_static_call(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    class: &AstNode,
    method: &str,
    args: &[Argument],
    finish: Opcode,
) -> Result<Operand, CompileError> {
    let class = lower_class_ref(cx, fb, class)?;
    let name = fb.string_const(method);
    fb.emit(
        Instruction::new(Opcode::InitStaticCall)
            .with_op1(class.op)
            .with_op2(name)
            .with_ext(class.mode),
    );
    lower_call_args(cx, fb, args)?;
    Ok(finish_call(fb, finish))
}

pub(crate) fn lower_new(cx: &mut LoweringContext, fb: &mut FunctionBuilder, class: &AstNode, args: &[Argument]) -> Result<Operand, CompileError> {
    let class = lower_class_ref(cx, fb, class)?;
    let res = fb.alloc_tmp();
    fb.emit(Instruction::new(Opcode::New).with_op1(class.op).with_result(res).with_ext(class.mode));
    lower_call_args(cx, fb, args)?;
    fb.emit(Instruction::new(Opcode::DoCall));
    Ok(res)
}

/// `spawn f(...)` compiles the call setup as usual and finishes it with
/// `SPAWN` instead of `DO_CALL`; `spawn $callable` calls it without
/// arguments.
pub(crate) fn lower_spawn(cx: &mut LoweringContext, fb: &mut FunctionBuilder, call: &AstNode) -> Result<Operand, CompileError> {
    match &call.kind {
        AstNodeKind::Call { callee, args } => lower_call(cx, fb, callee, args, Opcode::Spawn),
        AstNodeKind::MethodCall { object, method, args, nullsafe: false } => {
            lower_method_call(cx, fb, object, method, args, false, Opcode::Spawn)
        }
        AstNodeKind::MethodCall { nullsafe: true, .. } => Err(invalid(call, "Cannot spawn a nullsafe method call")),
        AstNodeKind::StaticCall { class, method, args } => lower_static_call(cx, fb, class, method, args, Opcode::Spawn),
        _ => {
            let v = lower_expr(cx, fb, call)?;
            fb.emit(Instruction::new(Opcode::InitDynamicCall).with_op1(v));
            Ok(finish_call(fb, Opcode::Spawn))
        }
    }
}

/// Variables an arrow function body reads from its defining scope.
fn free_variables(body: &AstNode, params: &[AstParam]) -> Vec<String> {
    fn walk(node: &AstNode, out: &mut Vec<String>) {
        match &node.kind {
            AstNodeKind::Variable { name } => {
                if name != "this" && !out.contains(name) {
                    out.push(name.clone());
                }
            }
            AstNodeKind::ArrowFn { params, body, .. } => {
                for name in free_variables(body, params) {
                    if !out.contains(&name) {
                        out.push(name);
                    }
                }
            }
            AstNodeKind::Closure { uses, .. } => {
                for u in uses {
                    if !out.contains(&u.name) {
                        out.push(u.name.clone());
                    }
                }
            }
            _ => {
                for child in children(node) {
                    walk(child, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(body, &mut out);
    out.retain(|n| !params.iter().any(|p| &p.name == n));
    out
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn lower_closure(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    node: &AstNode,
    params: &[AstParam],
    uses: &[ClosureUse],
    body: &[AstNode],
    arrow_body: Option<&AstNode>,
    by_ref_return: bool,
    is_static: bool,
) -> Result<Operand, CompileError> {
    let mut child = FunctionBuilder::new("{closure}", cx.file.clone(), node.line());
    child.scope_name = cx.current_class().map(|c| c.name.clone()).or_else(|| fb.scope_name.clone());
    child.flags.closure = true;
    child.flags.is_static = is_static;
    child.flags.by_ref_return = by_ref_return;

    cx.function_stack.push("{closure}".to_string());
    let compiled = compile_closure_body(cx, &mut child, node, params, uses, body, arrow_body);
    cx.function_stack.pop();
    let bindings = compiled?;

    let mut bound = Vec::with_capacity(bindings.len());
    for (name, child_cv, mode) in bindings {
        bound.push((fb.cv(&name), child_cv, mode));
    }

    let func = child.finish()?;
    let idx = fb.closures.len() as u32;
    fb.closures.push(Arc::new(func));
    let res = fb.alloc_tmp();
    fb.emit(Instruction::new(Opcode::CreateClosure).with_op1(Operand::raw(idx)).with_result(res));
    for (parent_cv, child_cv, mode) in bound {
        fb.emit(
            Instruction::new(Opcode::BindLexical)
                .with_op1(res)
                .with_op2(parent_cv)
                .with_ext(child_cv)
                .with_flags(mode),
        );
    }
    Ok(res)
}

/// Returns the lexical bindings as `(name, child slot, flags)`.
fn compile_closure_body(
    cx: &mut LoweringContext,
    child: &mut FunctionBuilder,
    node: &AstNode,
    params: &[AstParam],
    uses: &[ClosureUse],
    body: &[AstNode],
    arrow_body: Option<&AstNode>,
) -> Result<Vec<(String, u32, u8)>, CompileError> {
    lower_params(cx, child, params, node, false)?;

    let mut bindings = Vec::new();
    let mut seen = HashSet::new();
    for u in uses {
        if u.name == "this" {
            return Err(invalid(node, "Cannot use $this as lexical variable"));
        }
        if params.iter().any(|p| p.name == u.name) {
            return Err(invalid(node, format!("Cannot use lexical variable ${} as a parameter name", u.name)));
        }
        if !seen.insert(u.name.clone()) {
            return Err(malformed(node, format!("Cannot use variable ${} twice", u.name)));
        }
        let cv = child.cv(&u.name);
        bindings.push((u.name.clone(), cv.index, if u.by_ref { flags::BY_REF } else { 0 }));
    }

    match arrow_body {
        Some(expr) => {
            for name in free_variables(expr, params) {
                let cv = child.cv(&name);
                bindings.push((name, cv.index, flags::QUIET));
            }
            let v = lower_expr(cx, child, expr)?;
            child.emit(Instruction::new(Opcode::Return).with_op1(v));
        }
        None => {
            for stmt in body {
                lower_stmt(cx, child, stmt)?;
            }
            emit_implicit_return(child);
        }
    }
    Ok(bindings)
}

/// Literal initializers are stored inline; anything else becomes a small
/// function evaluated in class scope the first time the value is needed.
fn lower_initializer(cx: &mut LoweringContext, class: &str, member: &str, value: &AstNode) -> Result<Initializer, CompileError> {
    if let Some(c) = literal_constant(value) {
        return Ok(Initializer::Literal(c));
    }
    let mut fb = FunctionBuilder::new(format!("{}::{}", class, member), cx.file.clone(), value.line());
    fb.scope_name = Some(class.to_string());
    let v = lower_expr(cx, &mut fb, value)?;
    fb.emit(Instruction::new(Opcode::Return).with_op1(v));
    Ok(Initializer::Thunk(Arc::new(fb.finish()?)))
}

pub(crate) fn lower_class(cx: &mut LoweringContext, decl: &ClassDecl, node: &AstNode) -> Result<CompiledClass, CompileError> {
    let name = plain_name(&decl.name).to_string();
    if name.is_empty() {
        return Err(malformed(node, "class declaration without a name"));
    }
    cx.class_stack.push(ClassScope {
        name: name.clone(),
        parent: decl.parent.as_deref().map(|p| plain_name(p).to_string()),
        is_trait: decl.kind == ClassKind::Trait,
    });
    let res = lower_class_members(cx, decl, node, &name);
    cx.class_stack.pop();
    let (constants, properties, methods) = res?;

    log::debug!(
        "compiled class {}: {} constants, {} properties, {} methods",
        name,
        constants.len(),
        properties.len(),
        methods.len()
    );
    Ok(CompiledClass {
        name,
        kind: decl.kind,
        is_abstract: decl.is_abstract,
        is_final: decl.is_final,
        parent: decl.parent.as_deref().map(|p| plain_name(p).to_string()),
        interfaces: decl.interfaces.iter().map(|i| plain_name(i).to_string()).collect(),
        traits: decl.traits.iter().map(|t| plain_name(t).to_string()).collect(),
        constants,
        properties,
        methods,
        line: node.line(),
    })
}

type ClassMembers = (Vec<ClassConstant>, Vec<PropertyInfo>, Vec<CompiledMethod>);

fn lower_class_members(cx: &mut LoweringContext, decl: &ClassDecl, node: &AstNode, class: &str) -> Result<ClassMembers, CompileError> {
    let mut constants = Vec::with_capacity(decl.constants.len());
    for c in &decl.constants {
        if constants.iter().any(|e: &ClassConstant| e.name == c.name) {
            return Err(malformed(node, format!("Cannot redefine class constant {}::{}", class, c.name)));
        }
        constants.push(ClassConstant {
            name: c.name.clone(),
            value: lower_initializer(cx, class, &c.name, &c.value)?,
            visibility: c.visibility,
        });
    }

    let mut properties: Vec<PropertyInfo> = Vec::with_capacity(decl.properties.len());
    for p in &decl.properties {
        if properties.iter().any(|e| e.name == p.name) {
            return Err(malformed(node, format!("Cannot redeclare {}::${}", class, p.name)));
        }
        let default = match (&p.default, &p.type_hint) {
            (Some(d), _) => Some(lower_initializer(cx, class, &p.name, d)?),
            (None, None) => Some(Initializer::Literal(crate::ir::value::Constant::Null)),
            (None, Some(_)) => None,
        };
        properties.push(PropertyInfo {
            name: p.name.clone(),
            default,
            visibility: p.visibility,
            is_static: p.is_static,
            type_hint: p.type_hint.as_ref().map(TypeHint::from),
        });
    }

    let mut methods: Vec<CompiledMethod> = Vec::with_capacity(decl.methods.len());
    for m in &decl.methods {
        let mname = m.func.name.clone();
        if methods.iter().any(|e| e.name.eq_ignore_ascii_case(&mname)) {
            return Err(malformed(node, format!("Cannot redeclare {}::{}()", class, mname)));
        }
        if m.is_abstract && decl.kind == ClassKind::Class && !decl.is_abstract {
            return Err(invalid(
                node,
                format!("Class {} declares abstract method {}() and must therefore be declared abstract", class, mname),
            ));
        }
        let is_ctor = mname.eq_ignore_ascii_case("__construct");
        for p in &m.func.params {
            if let Some(vis) = p.promote {
                if !is_ctor || m.is_abstract {
                    return Err(invalid(node, "Cannot declare promoted property outside a constructor"));
                }
                if properties.iter().any(|e| e.name == p.name) {
                    return Err(malformed(node, format!("Cannot redeclare {}::${}", class, p.name)));
                }
                properties.push(PropertyInfo {
                    name: p.name.clone(),
                    default: if p.type_hint.is_some() { None } else { Some(Initializer::Literal(crate::ir::value::Constant::Null)) },
                    visibility: vis,
                    is_static: false,
                    type_hint: p.type_hint.as_ref().map(TypeHint::from),
                });
            }
        }
        let mut func = lower_function(cx, &m.func, node, format!("{}::{}", class, mname), Some(class.to_string()), is_ctor)?;
        func.flags.is_static = m.is_static;
        methods.push(CompiledMethod {
            name: mname,
            func: Arc::new(func),
            visibility: m.visibility,
            is_static: m.is_static,
            is_abstract: m.is_abstract || decl.kind == ClassKind::Interface,
            is_final: m.is_final,
        });
    }
    Ok((constants, properties, methods))
}
