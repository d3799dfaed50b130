//! Lowering helpers for statement nodes.
//!
//! Statements produce no value. Loops push a `LoopScope` so that `break`
//! and `continue` know where to jump, which foreach iterators to release on
//! the way out, and whether a `finally` block sits between them and their
//! target.
//!
//! See also: `ir::lower::lower_expr` for expression lowering helpers.

use crate::ast::{ArrayItem, AstNode, AstNodeKind, CatchClause, FunctionDecl, Param as AstParam, SwitchCase};
use crate::ir::err::CompileError;
use crate::ir::function::{CompiledFunction, Param, ParamDefault, TryRegion, TypeHint};
use crate::ir::instruction::{flags, Instruction, Operand};
use crate::ir::op::Opcode;
use crate::ir::value::Constant;

use super::function_builder::{ForeachScope, FunctionBuilder, LoopScope};
use super::lower_expr::{destructure, lower_expr, lower_place, read_place, unset_place, write_place};
use super::lower_objects;
use super::lowering_context::LoweringContext;
use super::{emit_implicit_return, invalid, literal_constant, malformed, plain_name, unsupported};

pub fn lower_stmt(cx: &mut LoweringContext, fb: &mut FunctionBuilder, node: &AstNode) -> Result<(), CompileError> {
    if node.line() != 0 {
        fb.current_line = node.line();
    }
    use AstNodeKind as K;
    match &node.kind {
        K::Script { body } => lower_block(cx, fb, body),
        K::Block { statements } => lower_block(cx, fb, statements),
        K::Nop => Ok(()),
        K::Echo { args } => {
            for arg in args {
                let v = lower_expr(cx, fb, arg)?;
                fb.emit(Instruction::new(Opcode::Echo).with_op1(v));
            }
            Ok(())
        }
        K::InlineHtml { value } => {
            let v = fb.string_const(value);
            fb.emit(Instruction::new(Opcode::Echo).with_op1(v));
            Ok(())
        }
        K::ExprStmt { expr } => {
            lower_expr(cx, fb, expr)?;
            Ok(())
        }
        K::If { condition, then_branch, else_branch } => {
            let cond = lower_expr(cx, fb, condition)?;
            let else_label = fb.new_label();
            fb.emit_branch(Instruction::new(Opcode::JmpZ).with_op1(cond), else_label);
            lower_stmt(cx, fb, then_branch)?;
            match else_branch {
                Some(else_branch) => {
                    let end = fb.new_label();
                    fb.emit_jump(Opcode::Jmp, end);
                    fb.bind_label(else_label);
                    lower_stmt(cx, fb, else_branch)?;
                    fb.bind_label(end);
                }
                None => fb.bind_label(else_label),
            }
            Ok(())
        }
        K::While { condition, body } => {
            let start = fb.new_label();
            let end = fb.new_label();
            fb.bind_label(start);
            let cond = lower_expr(cx, fb, condition)?;
            fb.emit_branch(Instruction::new(Opcode::JmpZ).with_op1(cond), end);
            lower_loop_body(cx, fb, body, end, start, None)?;
            fb.emit_jump(Opcode::Jmp, start);
            fb.bind_label(end);
            Ok(())
        }
        K::DoWhile { body, condition } => {
            let start = fb.new_label();
            let cont = fb.new_label();
            let end = fb.new_label();
            fb.bind_label(start);
            lower_loop_body(cx, fb, body, end, cont, None)?;
            fb.bind_label(cont);
            let cond = lower_expr(cx, fb, condition)?;
            fb.emit_branch(Instruction::new(Opcode::JmpNz).with_op1(cond), start);
            fb.bind_label(end);
            Ok(())
        }
        K::For { init, condition, step, body } => {
            for e in init {
                lower_expr(cx, fb, e)?;
            }
            let start = fb.new_label();
            let cont = fb.new_label();
            let end = fb.new_label();
            fb.bind_label(start);
            // every condition runs, the last one decides
            let mut last = None;
            for c in condition {
                last = Some(lower_expr(cx, fb, c)?);
            }
            if let Some(cond) = last {
                fb.emit_branch(Instruction::new(Opcode::JmpZ).with_op1(cond), end);
            }
            lower_loop_body(cx, fb, body, end, cont, None)?;
            fb.bind_label(cont);
            for e in step {
                lower_expr(cx, fb, e)?;
            }
            fb.emit_jump(Opcode::Jmp, start);
            fb.bind_label(end);
            Ok(())
        }
        K::Foreach { subject, key, value, by_ref, body } => {
            lower_foreach(cx, fb, node, subject, key.as_deref(), value, *by_ref, body)
        }
        K::Switch { subject, cases } => lower_switch(cx, fb, node, subject, cases),
        K::Break { depth } => lower_break_continue(fb, node, *depth, true),
        K::Continue { depth } => lower_break_continue(fb, node, *depth, false),
        K::Return { value } => {
            let v = match value {
                Some(v) => lower_expr(cx, fb, v)?,
                None => fb.null_const(),
            };
            let by_ref_iters: Vec<u32> = fb
                .loops
                .iter()
                .rev()
                .filter_map(|l| l.foreach)
                .filter(|f| f.by_ref)
                .map(|f| f.iter)
                .collect();
            for iter in by_ref_iters {
                fb.emit(Instruction::new(Opcode::FeFree).with_op1(Operand::tmp(iter)));
            }
            fb.emit(Instruction::new(Opcode::Return).with_op1(v));
            Ok(())
        }
        K::Global { names } => {
            for name in names {
                let cv = fb.cv(name);
                let n = fb.string_const(name);
                fb.emit(Instruction::new(Opcode::BindGlobal).with_op1(cv).with_op2(n));
            }
            Ok(())
        }
        K::StaticVar { vars } => {
            for var in vars {
                let init = match &var.default {
                    Some(d) => literal_constant(d)
                        .ok_or_else(|| invalid(d, "Constant expression contains invalid operations"))?,
                    None => Constant::Null,
                };
                let cv = fb.cv(&var.name);
                let init = fb.constant(init);
                let slot = fb.next_static_slot();
                fb.emit(Instruction::new(Opcode::BindStatic).with_op1(cv).with_op2(init).with_ext(slot));
            }
            Ok(())
        }
        K::Unset { targets } => {
            for target in targets {
                let place = lower_place(cx, fb, target)?;
                unset_place(fb, target, &place)?;
            }
            Ok(())
        }
        K::Try { body, catches, finally } => lower_try(cx, fb, node, body, catches, finally.as_deref()),
        K::FunctionDecl(decl) => {
            let func = lower_function(cx, decl, node, plain_name(&decl.name).to_string(), None, false)?;
            cx.register_function(func, node.location.clone())
        }
        K::ClassDecl(decl) => {
            let class = lower_objects::lower_class(cx, decl, node)?;
            cx.register_class(class, node.location.clone())
        }
        K::ConstDecl { name, value } => {
            let n = fb.string_const(plain_name(name));
            let v = lower_expr(cx, fb, value)?;
            fb.emit(Instruction::new(Opcode::DeclareConst).with_op1(n).with_op2(v));
            Ok(())
        }
        kind if kind.is_expression() => {
            lower_expr(cx, fb, node)?;
            Ok(())
        }
        other => Err(malformed(node, format!("unexpected {} in statement position", other))),
    }
}

fn lower_block(cx: &mut LoweringContext, fb: &mut FunctionBuilder, stmts: &[AstNode]) -> Result<(), CompileError> {
    for stmt in stmts {
        lower_stmt(cx, fb, stmt)?;
    }
    Ok(())
}

fn lower_loop_body(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    body: &AstNode,
    break_label: super::Label,
    continue_label: super::Label,
    foreach: Option<ForeachScope>,
) -> Result<(), CompileError> {
    fb.loops.push(LoopScope { break_label, continue_label, finally_depth: fb.finally_depth, foreach });
    let res = lower_stmt(cx, fb, body);
    fb.loops.pop();
    res
}

fn lower_break_continue(fb: &mut FunctionBuilder, node: &AstNode, depth: u32, is_break: bool) -> Result<(), CompileError> {
    let word = if is_break { "break" } else { "continue" };
    let depth = depth.max(1) as usize;
    if fb.loops.is_empty() {
        return Err(invalid(node, format!("'{}' not in the 'loop' or 'switch' context", word)));
    }
    if depth > fb.loops.len() {
        return Err(invalid(
            node,
            format!("Cannot '{}' {} level{}", word, depth, if depth == 1 { "" } else { "s" }),
        ));
    }
    let target_idx = fb.loops.len() - depth;
    let target = fb.loops[target_idx].clone();
    // a loop's own iterator is freed at its break label
    let inner: Vec<u32> = fb.loops[target_idx + 1..]
        .iter()
        .rev()
        .filter_map(|l| l.foreach.map(|f| f.iter))
        .collect();
    for iter in inner {
        fb.emit(Instruction::new(Opcode::FeFree).with_op1(Operand::tmp(iter)));
    }
    let label = if is_break { target.break_label } else { target.continue_label };
    let opcode = if fb.finally_depth > target.finally_depth { Opcode::JmpFinally } else { Opcode::Jmp };
    fb.emit_jump(opcode, label);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn lower_foreach(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    node: &AstNode,
    subject: &AstNode,
    key: Option<&AstNode>,
    value: &AstNode,
    by_ref: bool,
    body: &AstNode,
) -> Result<(), CompileError> {
    // by-reference iteration over something other than a plain variable
    // runs on a hidden copy that is stored back when the loop ends
    let mut write_back = None;
    let container = if by_ref {
        match &subject.kind {
            AstNodeKind::Variable { name } if name != "this" => fb.cv(name),
            _ => {
                let place = lower_place(cx, fb, subject)?;
                let hidden = fb.cv(&format!("\0fe{}", fb.current_len()));
                let current = read_place(fb, subject, &place, false)?;
                fb.emit(Instruction::new(Opcode::Assign).with_op1(hidden).with_op2(current));
                write_back = Some((place, hidden));
                hidden
            }
        }
    } else {
        lower_expr(cx, fb, subject)?
    };

    let iter = fb.alloc_tmp();
    let reset_flags = if by_ref { flags::BY_REF } else { 0 };
    fb.emit(Instruction::new(Opcode::FeReset).with_op1(container).with_result(iter).with_flags(reset_flags));

    let start = fb.new_label();
    let exit = fb.new_label();
    fb.bind_label(start);

    let direct = match &value.kind {
        AstNodeKind::Variable { name } if name != "this" => Some(fb.cv(name)),
        _ => None,
    };
    if by_ref && direct.is_none() {
        return Err(unsupported(value, "foreach by reference requires a plain variable"));
    }
    let fetched = direct.unwrap_or_else(|| fb.alloc_tmp());
    fb.emit_branch(
        Instruction::new(Opcode::FeFetch).with_op1(iter).with_result(fetched).with_flags(reset_flags),
        exit,
    );
    if direct.is_none() {
        match &value.kind {
            AstNodeKind::List { items } => {
                let items: Vec<Option<&ArrayItem>> = items.iter().map(|i| i.as_ref()).collect();
                destructure(cx, fb, value, fetched, &items)?;
            }
            AstNodeKind::ArrayLiteral { items } => {
                let items: Vec<Option<&ArrayItem>> = items.iter().map(Some).collect();
                destructure(cx, fb, value, fetched, &items)?;
            }
            _ => {
                let place = lower_place(cx, fb, value)?;
                write_place(fb, value, &place, fetched)?;
            }
        }
    }
    if let Some(key) = key {
        match &key.kind {
            AstNodeKind::Variable { name } if name != "this" => {
                let cv = fb.cv(name);
                fb.emit(Instruction::new(Opcode::FeKey).with_op1(iter).with_result(cv));
            }
            _ => {
                let t = fb.alloc_tmp();
                fb.emit(Instruction::new(Opcode::FeKey).with_op1(iter).with_result(t));
                let place = lower_place(cx, fb, key)?;
                write_place(fb, key, &place, t)?;
            }
        }
    }

    let scope = ForeachScope { iter: iter.index, by_ref };
    lower_loop_body(cx, fb, body, exit, start, Some(scope))?;
    fb.emit_jump(Opcode::Jmp, start);
    fb.bind_label(exit);
    fb.emit(Instruction::new(Opcode::FeFree).with_op1(iter));

    if let Some((place, hidden)) = write_back {
        write_place(fb, node, &place, hidden)?;
        fb.emit(Instruction::new(Opcode::Unset).with_op1(hidden));
    }
    Ok(())
}

fn lower_switch(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    node: &AstNode,
    subject: &AstNode,
    cases: &[SwitchCase],
) -> Result<(), CompileError> {
    let v = lower_expr(cx, fb, subject)?;
    let subject = if v.is_variable() {
        let t = fb.alloc_tmp();
        fb.emit(Instruction::new(Opcode::QmAssign).with_op1(v).with_result(t));
        t
    } else {
        v
    };
    let end = fb.new_label();
    let mut labels = Vec::with_capacity(cases.len());
    let mut default = None;
    for case in cases {
        let label = fb.new_label();
        labels.push(label);
        match &case.test {
            Some(test) => {
                let t = lower_expr(cx, fb, test)?;
                let res = fb.alloc_tmp();
                fb.emit(Instruction::new(Opcode::IsEqual).with_op1(subject).with_op2(t).with_result(res));
                fb.emit_branch(Instruction::new(Opcode::JmpNz).with_op1(res), label);
            }
            None => {
                if default.is_some() {
                    return Err(malformed(node, "Switch statements may only contain one default clause"));
                }
                default = Some(label);
            }
        }
    }
    fb.emit_jump(Opcode::Jmp, default.unwrap_or(end));

    // `continue` targeting a switch behaves like `break`
    fb.loops.push(LoopScope { break_label: end, continue_label: end, finally_depth: fb.finally_depth, foreach: None });
    let mut res = Ok(());
    for (case, label) in cases.iter().zip(labels) {
        fb.bind_label(label);
        if let Err(e) = lower_block(cx, fb, &case.body) {
            res = Err(e);
            break;
        }
    }
    fb.loops.pop();
    res?;
    fb.bind_label(end);
    Ok(())
}

fn lower_try(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    node: &AstNode,
    body: &AstNode,
    catches: &[CatchClause],
    finally: Option<&AstNode>,
) -> Result<(), CompileError> {
    if catches.is_empty() && finally.is_none() {
        return Err(malformed(node, "Cannot use try without catch or finally"));
    }
    let try_start = fb.current_len() as u32;
    let after = fb.new_label();
    if finally.is_some() {
        fb.finally_depth += 1;
    }

    lower_stmt(cx, fb, body)?;
    fb.emit_jump(Opcode::Jmp, after);

    let catch_start = if catches.is_empty() { None } else { Some(fb.current_len() as u32) };
    for clause in catches {
        if clause.types.is_empty() {
            return Err(malformed(node, "catch clause without a type"));
        }
        let body_label = fb.new_label();
        let next_clause = fb.new_label();
        let var = match &clause.var {
            Some(name) => fb.cv(name),
            None => Operand::UNUSED,
        };
        for (i, ty) in clause.types.iter().enumerate() {
            let class = fb.string_const(plain_name(ty));
            let last = i + 1 == clause.types.len();
            let mismatch = if last { next_clause } else { fb.new_label() };
            fb.emit_branch(Instruction::new(Opcode::Catch).with_op1(class).with_result(var), mismatch);
            if !last {
                fb.emit_jump(Opcode::Jmp, body_label);
                fb.bind_label(mismatch);
            }
        }
        fb.bind_label(body_label);
        lower_stmt(cx, fb, &clause.body)?;
        fb.emit_jump(Opcode::Jmp, after);
        fb.bind_label(next_clause);
    }
    if !catches.is_empty() {
        fb.emit(Instruction::new(Opcode::Rethrow));
    }

    let finally_start = match finally {
        Some(finally) => {
            fb.finally_depth -= 1;
            let start = fb.current_len() as u32;
            fb.bind_label(after);
            lower_stmt(cx, fb, finally)?;
            fb.emit(Instruction::new(Opcode::FinallyEnd).with_op1(Operand::raw(start)));
            Some(start)
        }
        None => {
            fb.bind_label(after);
            None
        }
    };

    let end = fb.current_len() as u32;
    log::trace!("try region {}..{} in {}", try_start, end, fb.name);
    fb.try_regions.push(TryRegion { try_start, catch_start, finally_start, end });
    Ok(())
}

/// Compile parameter bindings and the prologue that evaluates non-literal
/// defaults. Parameters occupy the first compiled-variable slots in order.
pub(crate) fn lower_params(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    params: &[AstParam],
    node: &AstNode,
    allow_promotion: bool,
) -> Result<(), CompileError> {
    for (i, p) in params.iter().enumerate() {
        if fb.lookup_cv(&p.name).is_some() {
            return Err(malformed(node, format!("Redefinition of parameter ${}", p.name)));
        }
        if p.name == "this" {
            return Err(invalid(node, "Cannot use $this as parameter"));
        }
        if p.variadic && i + 1 != params.len() {
            return Err(malformed(node, "Only the last parameter can be variadic"));
        }
        fb.cv(&p.name);
        let default = match &p.default {
            None => ParamDefault::None,
            Some(d) => match literal_constant(d) {
                Some(c) => ParamDefault::Constant(c),
                None => ParamDefault::Code,
            },
        };
        if p.variadic {
            fb.flags.variadic = true;
        }
        fb.params.push(Param {
            name: p.name.clone(),
            type_hint: p.type_hint.as_ref().map(TypeHint::from),
            by_ref: p.by_ref,
            variadic: p.variadic,
            default,
        });
    }

    for (i, p) in params.iter().enumerate() {
        let Some(d) = &p.default else { continue };
        if literal_constant(d).is_some() {
            continue;
        }
        let skip = fb.new_label();
        fb.emit_branch(Instruction::new(Opcode::JmpSkipDefault).with_op1(Operand::raw(i as u32)), skip);
        let v = lower_expr(cx, fb, d)?;
        let cv = fb.cv(&p.name);
        fb.emit(Instruction::new(Opcode::Assign).with_op1(cv).with_op2(v));
        fb.bind_label(skip);
    }

    for p in params {
        if p.promote.is_none() {
            continue;
        }
        if !allow_promotion {
            return Err(invalid(node, "Cannot declare promoted property outside a constructor"));
        }
        let this = fb.cv("this");
        let name = fb.string_const(&p.name);
        let cv = fb.cv(&p.name);
        fb.emit(Instruction::new(Opcode::AssignObj).with_op1(this).with_op2(name));
        fb.emit(Instruction::new(Opcode::OpData).with_op1(cv));
    }
    Ok(())
}

/// Compile a named function or method body into its own unit of code.
pub(crate) fn lower_function(
    cx: &mut LoweringContext,
    decl: &FunctionDecl,
    node: &AstNode,
    display_name: String,
    scope: Option<String>,
    allow_promotion: bool,
) -> Result<CompiledFunction, CompileError> {
    let mut fb = FunctionBuilder::new(display_name, cx.file.clone(), node.line());
    fb.scope_name = scope;
    fb.flags.by_ref_return = decl.by_ref_return;
    fb.return_type = decl.return_type.as_ref().map(TypeHint::from);

    cx.function_stack.push(plain_name(&decl.name).to_string());
    let res = lower_params(cx, &mut fb, &decl.params, node, allow_promotion).and_then(|_| lower_block(cx, &mut fb, &decl.body));
    cx.function_stack.pop();
    res?;

    emit_implicit_return(&mut fb);
    fb.finish()
}
