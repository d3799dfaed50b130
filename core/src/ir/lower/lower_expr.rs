use crate::ast::{
    ArrayItem, AstNode, AstNodeKind, BinaryOperator, CastKind, IncDecOperator, MagicConstKind,
    UnaryOperator,
};
use crate::ir::err::CompileError;
use crate::ir::instruction::{cast, class_ref, flags, Instruction, Operand};
use crate::ir::op::Opcode;
use crate::ir::value::Constant;

use super::function_builder::FunctionBuilder;
use super::lower_objects;
use super::lowering_context::LoweringContext;
use super::{invalid, literal_constant, malformed, plain_name, unsupported};

/// A class operand together with its `class_ref` interpretation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassOperand {
    pub op: Operand,
    pub mode: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum PlaceRoot {
    /// Compiled variable or constant-named variable.
    Var(Operand),
    /// `$$name` with a run-time name.
    Dynamic(Operand),
    Prop { object: Operand, name: Operand },
    StaticProp { class: ClassOperand, name: Operand },
}

/// An assignable location: a root plus a chain of dimension keys. A `None`
/// key is the append form `[]`.
#[derive(Debug, Clone)]
pub(crate) struct Place {
    pub root: PlaceRoot,
    pub dims: Vec<Option<Operand>>,
}

pub(crate) fn binary_opcode(op: BinaryOperator) -> Option<Opcode> {
    let code = match op {
        BinaryOperator::Add => Opcode::Add,
        BinaryOperator::Sub => Opcode::Sub,
        BinaryOperator::Mul => Opcode::Mul,
        BinaryOperator::Div => Opcode::Div,
        BinaryOperator::Mod => Opcode::Mod,
        BinaryOperator::Pow => Opcode::Pow,
        BinaryOperator::Concat => Opcode::Concat,
        BinaryOperator::BitAnd => Opcode::BitAnd,
        BinaryOperator::BitOr => Opcode::BitOr,
        BinaryOperator::BitXor => Opcode::BitXor,
        BinaryOperator::Shl => Opcode::Shl,
        BinaryOperator::Shr => Opcode::Shr,
        BinaryOperator::Eq => Opcode::IsEqual,
        BinaryOperator::Ne => Opcode::IsNotEqual,
        BinaryOperator::Identical => Opcode::IsIdentical,
        BinaryOperator::NotIdentical => Opcode::IsNotIdentical,
        BinaryOperator::Lt | BinaryOperator::Gt => Opcode::IsSmaller,
        BinaryOperator::Le | BinaryOperator::Ge => Opcode::IsSmallerOrEqual,
        BinaryOperator::Spaceship => Opcode::Spaceship,
        BinaryOperator::Xor => Opcode::BoolXor,
        BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Coalesce => return None,
    };
    Some(code)
}

pub(crate) fn cast_code(kind: CastKind) -> u32 {
    match kind {
        CastKind::Int => cast::INT,
        CastKind::Float => cast::FLOAT,
        CastKind::String => cast::STRING,
        CastKind::Bool => cast::BOOL,
        CastKind::Array => cast::ARRAY,
        CastKind::Object => cast::OBJECT,
        CastKind::Unset => cast::UNSET,
    }
}

fn emit_binary(fb: &mut FunctionBuilder, opcode: Opcode, l: Operand, r: Operand) -> Operand {
    let res = fb.alloc_tmp();
    fb.emit(Instruction::new(opcode).with_op1(l).with_op2(r).with_result(res));
    res
}

fn emit_unary(fb: &mut FunctionBuilder, opcode: Opcode, v: Operand) -> Operand {
    let res = fb.alloc_tmp();
    fb.emit(Instruction::new(opcode).with_op1(v).with_result(res));
    res
}

fn qm_assign(fb: &mut FunctionBuilder, target: Operand, v: Operand) {
    fb.emit(Instruction::new(Opcode::QmAssign).with_op1(v).with_result(target));
}

pub fn lower_expr(cx: &mut LoweringContext, fb: &mut FunctionBuilder, node: &AstNode) -> Result<Operand, CompileError> {
    if node.line() != 0 {
        fb.current_line = node.line();
    }
    use AstNodeKind as K;
    match &node.kind {
        K::Integer { value } => Ok(fb.constant(Constant::Int(*value))),
        K::Float { value } => Ok(fb.constant(Constant::Float(*value))),
        K::String { value } => Ok(fb.constant(Constant::String(value.clone()))),
        K::Bool { value } => Ok(fb.constant(Constant::Bool(*value))),
        K::Null => Ok(fb.null_const()),

        K::Variable { name } => Ok(fb.cv(name)),
        K::VariableVariable { name } => {
            if let AstNodeKind::String { value } = &name.kind {
                let idx = fb.string_const(value);
                return Ok(Operand::var(idx.index));
            }
            let n = lower_expr(cx, fb, name)?;
            Ok(emit_unary(fb, Opcode::FetchVar, n))
        }

        K::Interpolated { parts } => {
            let mut acc: Option<Operand> = None;
            for part in parts {
                let v = lower_expr(cx, fb, part)?;
                acc = Some(match acc {
                    None => v,
                    Some(prev) => emit_binary(fb, Opcode::Concat, prev, v),
                });
            }
            match acc {
                None => Ok(fb.string_const("")),
                Some(v) if parts.len() == 1 => {
                    let res = fb.alloc_tmp();
                    fb.emit(Instruction::new(Opcode::Cast).with_op1(v).with_result(res).with_ext(cast_code(CastKind::String)));
                    Ok(res)
                }
                Some(v) => Ok(v),
            }
        }

        K::ArrayLiteral { items } => {
            if let Some(c) = literal_constant(node) {
                return Ok(fb.constant(c));
            }
            lower_array_literal(cx, fb, node, items)
        }
        K::List { .. } => Err(invalid(node, "Cannot use list() outside of an assignment")),

        K::Assign { target, value } => lower_assign(cx, fb, target, value),
        K::AssignRef { target, value } => lower_assign_ref(cx, fb, node, target, value),
        K::CompoundAssign { op, target, value } => lower_compound_assign(cx, fb, *op, target, value),

        K::BinaryOp { left, op, right } => lower_binary(cx, fb, *op, left, right),
        K::UnaryOp { op, expr } => {
            if let Some(c) = literal_constant(node) {
                return Ok(fb.constant(c));
            }
            let v = lower_expr(cx, fb, expr)?;
            let opcode = match op {
                UnaryOperator::Not => Opcode::BoolNot,
                UnaryOperator::Minus => Opcode::Neg,
                UnaryOperator::Plus => Opcode::Plus,
                UnaryOperator::BitNot => Opcode::BitNot,
            };
            Ok(emit_unary(fb, opcode, v))
        }
        K::IncDec { op, target } => lower_inc_dec(cx, fb, *op, target),

        K::Ternary { condition, then, otherwise } => {
            let res = fb.alloc_tmp();
            let end = fb.new_label();
            let cond = lower_expr(cx, fb, condition)?;
            match then {
                Some(then) => {
                    let else_label = fb.new_label();
                    fb.emit_branch(Instruction::new(Opcode::JmpZ).with_op1(cond), else_label);
                    let v = lower_expr(cx, fb, then)?;
                    qm_assign(fb, res, v);
                    fb.emit_jump(Opcode::Jmp, end);
                    fb.bind_label(else_label);
                }
                None => {
                    qm_assign(fb, res, cond);
                    fb.emit_branch(Instruction::new(Opcode::JmpNz).with_op1(res), end);
                }
            }
            let w = lower_expr(cx, fb, otherwise)?;
            qm_assign(fb, res, w);
            fb.bind_label(end);
            Ok(res)
        }

        K::Call { callee, args } => lower_objects::lower_call(cx, fb, callee, args, Opcode::DoCall),
        K::Name { name } => {
            if let Some(c) = literal_constant(node) {
                return Ok(fb.constant(c));
            }
            let n = fb.string_const(plain_name(name));
            Ok(emit_unary(fb, Opcode::FetchConstant, n))
        }
        K::PropertyFetch { object, property, nullsafe } => {
            let obj = lower_expr(cx, fb, object)?;
            let name = lower_member_name(cx, fb, property)?;
            let res = fb.alloc_tmp();
            let end = fb.new_label();
            if *nullsafe {
                fb.emit_branch(Instruction::new(Opcode::JmpNull).with_op1(obj).with_result(res), end);
            }
            fb.emit(Instruction::new(Opcode::FetchObjR).with_op1(obj).with_op2(name).with_result(res));
            fb.bind_label(end);
            Ok(res)
        }
        K::MethodCall { object, method, args, nullsafe } => {
            lower_objects::lower_method_call(cx, fb, object, method, args, *nullsafe, Opcode::DoCall)
        }
        K::StaticCall { class, method, args } => {
            lower_objects::lower_static_call(cx, fb, class, method, args, Opcode::DoCall)
        }
        K::StaticPropertyFetch { class, property } => {
            let class = lower_class_ref(cx, fb, class)?;
            let name = fb.string_const(property);
            let res = fb.alloc_tmp();
            fb.emit(
                Instruction::new(Opcode::FetchStaticPropR)
                    .with_op1(class.op)
                    .with_op2(name)
                    .with_result(res)
                    .with_ext(class.mode),
            );
            Ok(res)
        }
        K::ClassConstFetch { class, name } => {
            let class = lower_class_ref(cx, fb, class)?;
            if name.eq_ignore_ascii_case("class") {
                if class.mode == class_ref::NAMED {
                    return Ok(class.op);
                }
                let res = fb.alloc_tmp();
                fb.emit(Instruction::new(Opcode::FetchClassName).with_op1(class.op).with_result(res).with_ext(class.mode));
                return Ok(res);
            }
            let n = fb.string_const(name);
            let res = fb.alloc_tmp();
            fb.emit(
                Instruction::new(Opcode::FetchClassConstant)
                    .with_op1(class.op)
                    .with_op2(n)
                    .with_result(res)
                    .with_ext(class.mode),
            );
            Ok(res)
        }
        K::New { class, args } => lower_objects::lower_new(cx, fb, class, args),
        K::Index { base, index } => {
            let Some(index) = index else {
                return Err(invalid(node, "Cannot use [] for reading"));
            };
            let b = lower_expr(cx, fb, base)?;
            let k = lower_expr(cx, fb, index)?;
            Ok(emit_binary(fb, Opcode::FetchDimR, b, k))
        }
        K::Closure { params, uses, body, by_ref_return, is_static } => {
            lower_objects::lower_closure(cx, fb, node, params, uses, body, None, *by_ref_return, *is_static)
        }
        K::ArrowFn { params, body, is_static } => {
            lower_objects::lower_closure(cx, fb, node, params, &[], &[], Some(body.as_ref()), false, *is_static)
        }

        K::Isset { targets } => {
            if targets.is_empty() {
                return Err(malformed(node, "isset() requires at least one argument"));
            }
            let res = fb.alloc_tmp();
            let end = fb.new_label();
            for (i, target) in targets.iter().enumerate() {
                let v = lower_quiet(cx, fb, target)?;
                fb.emit(Instruction::new(Opcode::IssetCheck).with_op1(v).with_result(res));
                if i + 1 < targets.len() {
                    fb.emit_branch(Instruction::new(Opcode::JmpZ).with_op1(res), end);
                }
            }
            fb.bind_label(end);
            Ok(res)
        }
        K::Empty { expr } => {
            let v = lower_quiet(cx, fb, expr)?;
            Ok(emit_unary(fb, Opcode::EmptyCheck, v))
        }
        K::Cast { cast, expr } => {
            let v = lower_expr(cx, fb, expr)?;
            if *cast == CastKind::Unset {
                return Ok(fb.null_const());
            }
            let res = fb.alloc_tmp();
            fb.emit(Instruction::new(Opcode::Cast).with_op1(v).with_result(res).with_ext(cast_code(*cast)));
            Ok(res)
        }
        K::Instanceof { expr, class } => {
            let v = lower_expr(cx, fb, expr)?;
            let class = lower_class_ref(cx, fb, class)?;
            let res = fb.alloc_tmp();
            fb.emit(
                Instruction::new(Opcode::Instanceof)
                    .with_op1(v)
                    .with_op2(class.op)
                    .with_result(res)
                    .with_ext(class.mode),
            );
            Ok(res)
        }
        K::Clone { expr } => {
            let v = lower_expr(cx, fb, expr)?;
            Ok(emit_unary(fb, Opcode::Clone, v))
        }
        K::Print { expr } => {
            let v = lower_expr(cx, fb, expr)?;
            fb.emit(Instruction::new(Opcode::Echo).with_op1(v));
            Ok(fb.int_const(1))
        }
        K::Exit { value } => {
            let mut insn = Instruction::new(Opcode::Exit);
            if let Some(v) = value {
                insn = insn.with_op1(lower_expr(cx, fb, v)?);
            }
            fb.emit(insn);
            Ok(fb.null_const())
        }
        K::Throw { expr } => {
            let v = lower_expr(cx, fb, expr)?;
            fb.emit(Instruction::new(Opcode::Throw).with_op1(v));
            Ok(fb.null_const())
        }
        K::Match { subject, arms } => {
            let subject = lower_expr(cx, fb, subject)?;
            let res = fb.alloc_tmp();
            let end = fb.new_label();
            let mut labels = Vec::with_capacity(arms.len());
            let mut default = None;
            for arm in arms {
                let label = fb.new_label();
                labels.push(label);
                match &arm.conditions {
                    Some(conds) => {
                        for c in conds {
                            let v = lower_expr(cx, fb, c)?;
                            let t = emit_binary(fb, Opcode::IsIdentical, subject, v);
                            fb.emit_branch(Instruction::new(Opcode::JmpNz).with_op1(t), label);
                        }
                    }
                    None => {
                        if default.is_some() {
                            return Err(malformed(node, "Match expressions may only contain one default arm"));
                        }
                        default = Some(label);
                    }
                }
            }
            match default {
                Some(label) => {
                    fb.emit_jump(Opcode::Jmp, label);
                }
                None => {
                    fb.emit(Instruction::new(Opcode::MatchError).with_op1(subject));
                }
            }
            for (arm, label) in arms.iter().zip(labels) {
                fb.bind_label(label);
                let v = lower_expr(cx, fb, &arm.body)?;
                qm_assign(fb, res, v);
                fb.emit_jump(Opcode::Jmp, end);
            }
            fb.bind_label(end);
            Ok(res)
        }
        K::Yield { key, value } => {
            fb.flags.generator = true;
            let mut insn = Instruction::new(Opcode::Yield);
            if let Some(v) = value {
                insn = insn.with_op1(lower_expr(cx, fb, v)?);
            }
            if let Some(k) = key {
                insn = insn.with_op2(lower_expr(cx, fb, k)?);
            }
            let res = fb.alloc_tmp();
            fb.emit(insn.with_result(res));
            Ok(res)
        }
        K::YieldFrom { expr } => {
            fb.flags.generator = true;
            let v = lower_expr(cx, fb, expr)?;
            Ok(emit_unary(fb, Opcode::YieldFrom, v))
        }
        K::Spawn { call } => lower_objects::lower_spawn(cx, fb, call),
        K::Await { expr } => {
            let v = lower_expr(cx, fb, expr)?;
            Ok(emit_unary(fb, Opcode::Await, v))
        }
        K::MagicConst { magic } => Ok(lower_magic(cx, fb, *magic)),

        other => Err(malformed(node, format!("{} is not an expression", other))),
    }
}

fn lower_magic(cx: &LoweringContext, fb: &mut FunctionBuilder, magic: MagicConstKind) -> Operand {
    let class = cx.current_class().map(|c| c.name.clone()).unwrap_or_default();
    let function = cx.function_stack.last().cloned().unwrap_or_default();
    match magic {
        MagicConstKind::Line => fb.int_const(fb.current_line as i64),
        MagicConstKind::File => fb.string_const(&cx.file.clone()),
        MagicConstKind::Dir => {
            let dir = std::path::Path::new(&cx.file)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            fb.string_const(&dir)
        }
        MagicConstKind::Function => fb.string_const(&function),
        MagicConstKind::Class => fb.string_const(&class),
        MagicConstKind::Method => {
            if class.is_empty() {
                fb.string_const(&function)
            } else {
                fb.string_const(&format!("{}::{}", class, function))
            }
        }
    }
}

fn lower_array_literal(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    node: &AstNode,
    items: &[ArrayItem],
) -> Result<Operand, CompileError> {
    let res = fb.alloc_tmp();
    fb.emit(Instruction::new(Opcode::InitArray).with_result(res).with_ext(items.len() as u32));
    for item in items {
        if item.by_ref {
            return Err(unsupported(node, "references to array elements are not supported"));
        }
        if item.unpack {
            let v = lower_expr(cx, fb, &item.value)?;
            fb.emit(Instruction::new(Opcode::AddArrayUnpack).with_op1(v).with_result(res));
            continue;
        }
        let key = match &item.key {
            Some(k) => Some(lower_expr(cx, fb, k)?),
            None => None,
        };
        let v = lower_expr(cx, fb, &item.value)?;
        let mut insn = Instruction::new(Opcode::AddArrayElement).with_op1(v).with_result(res);
        if let Some(k) = key {
            insn = insn.with_op2(k);
        }
        fb.emit(insn);
    }
    Ok(res)
}

fn lower_binary(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    op: BinaryOperator,
    left: &AstNode,
    right: &AstNode,
) -> Result<Operand, CompileError> {
    match op {
        BinaryOperator::And | BinaryOperator::Or => {
            let res = fb.alloc_tmp();
            let end = fb.new_label();
            let l = lower_expr(cx, fb, left)?;
            fb.emit(Instruction::new(Opcode::Bool).with_op1(l).with_result(res));
            let jump = if op == BinaryOperator::And { Opcode::JmpZ } else { Opcode::JmpNz };
            fb.emit_branch(Instruction::new(jump).with_op1(res), end);
            let r = lower_expr(cx, fb, right)?;
            fb.emit(Instruction::new(Opcode::Bool).with_op1(r).with_result(res));
            fb.bind_label(end);
            Ok(res)
        }
        BinaryOperator::Coalesce => {
            let res = fb.alloc_tmp();
            let end = fb.new_label();
            let l = lower_quiet(cx, fb, left)?;
            fb.emit_branch(Instruction::new(Opcode::Coalesce).with_op1(l).with_result(res), end);
            let r = lower_expr(cx, fb, right)?;
            qm_assign(fb, res, r);
            fb.bind_label(end);
            Ok(res)
        }
        _ => {
            let l = lower_expr(cx, fb, left)?;
            let r = lower_expr(cx, fb, right)?;
            let opcode = binary_opcode(op).unwrap_or(Opcode::Nop);
            // `a > b` is `b < a`
            if matches!(op, BinaryOperator::Gt | BinaryOperator::Ge) {
                Ok(emit_binary(fb, opcode, r, l))
            } else {
                Ok(emit_binary(fb, opcode, l, r))
            }
        }
    }
}

/// Lower an expression in isset/?? mode: missing variables, keys and
/// properties read as null without diagnostics.
pub(crate) fn lower_quiet(cx: &mut LoweringContext, fb: &mut FunctionBuilder, node: &AstNode) -> Result<Operand, CompileError> {
    match &node.kind {
        AstNodeKind::Variable { name } => Ok(fb.cv(name)),
        AstNodeKind::VariableVariable { name } => {
            let n = lower_expr(cx, fb, name)?;
            let res = fb.alloc_tmp();
            fb.emit(Instruction::new(Opcode::FetchVar).with_op1(n).with_result(res).with_flags(flags::QUIET));
            Ok(res)
        }
        AstNodeKind::Index { base, index: Some(index) } => {
            let b = lower_quiet(cx, fb, base)?;
            let k = lower_expr(cx, fb, index)?;
            let res = fb.alloc_tmp();
            fb.emit(Instruction::new(Opcode::FetchDimR).with_op1(b).with_op2(k).with_result(res).with_flags(flags::QUIET));
            Ok(res)
        }
        AstNodeKind::PropertyFetch { object, property, .. } => {
            let obj = lower_quiet(cx, fb, object)?;
            let name = lower_member_name(cx, fb, property)?;
            let res = fb.alloc_tmp();
            let end = fb.new_label();
            fb.emit_branch(Instruction::new(Opcode::JmpNull).with_op1(obj).with_result(res), end);
            fb.emit(Instruction::new(Opcode::FetchObjR).with_op1(obj).with_op2(name).with_result(res).with_flags(flags::QUIET));
            fb.bind_label(end);
            Ok(res)
        }
        AstNodeKind::StaticPropertyFetch { class, property } => {
            let class = lower_class_ref(cx, fb, class)?;
            let name = fb.string_const(property);
            let res = fb.alloc_tmp();
            fb.emit(
                Instruction::new(Opcode::FetchStaticPropR)
                    .with_op1(class.op)
                    .with_op2(name)
                    .with_result(res)
                    .with_ext(class.mode)
                    .with_flags(flags::QUIET),
            );
            Ok(res)
        }
        _ => lower_expr(cx, fb, node),
    }
}

/// Property and method names: a bare identifier becomes a string constant,
/// anything else is evaluated.
pub(crate) fn lower_member_name(cx: &mut LoweringContext, fb: &mut FunctionBuilder, node: &AstNode) -> Result<Operand, CompileError> {
    match &node.kind {
        AstNodeKind::Name { name } => Ok(fb.string_const(name)),
        AstNodeKind::String { value } => Ok(fb.string_const(value)),
        _ => lower_expr(cx, fb, node),
    }
}

pub(crate) fn lower_class_ref(cx: &mut LoweringContext, fb: &mut FunctionBuilder, node: &AstNode) -> Result<ClassOperand, CompileError> {
    if let AstNodeKind::Name { name } = &node.kind {
        let mode = match name.to_ascii_lowercase().as_str() {
            "self" => class_ref::SELF,
            "parent" => class_ref::PARENT,
            "static" => class_ref::STATIC,
            _ => class_ref::NAMED,
        };
        if mode != class_ref::NAMED {
            if cx.current_class().is_none() && fb.scope_name.is_none() && !fb.flags.closure {
                return Err(invalid(node, format!("Cannot use \"{}\" when no class scope is active", name)));
            }
            return Ok(ClassOperand { op: Operand::UNUSED, mode });
        }
        return Ok(ClassOperand { op: fb.string_const(plain_name(name)), mode });
    }
    let op = lower_expr(cx, fb, node)?;
    Ok(ClassOperand { op, mode: class_ref::DYNAMIC })
}

pub(crate) fn lower_place(cx: &mut LoweringContext, fb: &mut FunctionBuilder, node: &AstNode) -> Result<Place, CompileError> {
    match &node.kind {
        AstNodeKind::Variable { name } => {
            if name == "this" {
                return Err(invalid(node, "Cannot re-assign $this"));
            }
            Ok(Place { root: PlaceRoot::Var(fb.cv(name)), dims: Vec::new() })
        }
        AstNodeKind::VariableVariable { name } => {
            if let AstNodeKind::String { value } = &name.kind {
                let idx = fb.string_const(value);
                return Ok(Place { root: PlaceRoot::Var(Operand::var(idx.index)), dims: Vec::new() });
            }
            let n = lower_expr(cx, fb, name)?;
            Ok(Place { root: PlaceRoot::Dynamic(n), dims: Vec::new() })
        }
        AstNodeKind::Index { base, index } => {
            let mut place = lower_place(cx, fb, base)?;
            let key = match index {
                Some(k) => Some(lower_expr(cx, fb, k)?),
                None => None,
            };
            place.dims.push(key);
            Ok(place)
        }
        AstNodeKind::PropertyFetch { object, property, nullsafe } => {
            if *nullsafe {
                return Err(invalid(node, "Can't use nullsafe operator in write context"));
            }
            let object = lower_expr(cx, fb, object)?;
            let name = lower_member_name(cx, fb, property)?;
            Ok(Place { root: PlaceRoot::Prop { object, name }, dims: Vec::new() })
        }
        AstNodeKind::StaticPropertyFetch { class, property } => {
            let class = lower_class_ref(cx, fb, class)?;
            let name = fb.string_const(property);
            Ok(Place { root: PlaceRoot::StaticProp { class, name }, dims: Vec::new() })
        }
        other => Err(invalid(node, format!("Cannot use {} in write context", other))),
    }
}

/// Take the containers along a dimension chain out for modification.
/// Returns `c0..c(n)` for the first `n` keys; `c0` is the root container.
fn fetch_write_chain(fb: &mut FunctionBuilder, node: &AstNode, place: &Place, n: usize, quiet: bool) -> Result<Vec<Operand>, CompileError> {
    let extra = if quiet { flags::QUIET } else { 0 };
    let c0 = match place.root {
        PlaceRoot::Var(v) => v,
        PlaceRoot::Dynamic(_) => {
            return Err(unsupported(node, "nested writes through a variable variable are not supported"));
        }
        PlaceRoot::Prop { object, name } => {
            let t = fb.alloc_tmp();
            fb.emit(Instruction::new(Opcode::FetchObjW).with_op1(object).with_op2(name).with_result(t).with_flags(extra));
            t
        }
        PlaceRoot::StaticProp { class, name } => {
            let t = fb.alloc_tmp();
            fb.emit(
                Instruction::new(Opcode::FetchStaticPropW)
                    .with_op1(class.op)
                    .with_op2(name)
                    .with_result(t)
                    .with_ext(class.mode)
                    .with_flags(extra),
            );
            t
        }
    };
    let mut chain = vec![c0];
    for key in place.dims.iter().take(n) {
        let cur = chain[chain.len() - 1];
        let t = fb.alloc_tmp();
        let mut insn = Instruction::new(Opcode::FetchDimW).with_op1(cur).with_result(t).with_flags(extra);
        if let Some(k) = key {
            insn = insn.with_op2(*k);
        }
        fb.emit(insn);
        chain.push(t);
    }
    Ok(chain)
}

fn emit_assign_dim(fb: &mut FunctionBuilder, container: Operand, key: Option<Operand>, value: Operand, extra: u8) {
    let mut insn = Instruction::new(Opcode::AssignDim).with_op1(container).with_flags(extra);
    if let Some(k) = key {
        insn = insn.with_op2(k);
    }
    fb.emit(insn);
    fb.emit(Instruction::new(Opcode::OpData).with_op1(value));
}

/// Store the containers taken by `fetch_write_chain` back, innermost first.
fn put_back(fb: &mut FunctionBuilder, place: &Place, chain: &[Operand], extra: u8) {
    for i in (1..chain.len()).rev() {
        emit_assign_dim(fb, chain[i - 1], place.dims[i - 1], chain[i], extra | flags::PUT_BACK);
    }
    match place.root {
        PlaceRoot::Prop { object, name } => {
            fb.emit(Instruction::new(Opcode::AssignObj).with_op1(object).with_op2(name).with_flags(flags::PUT_BACK));
            fb.emit(Instruction::new(Opcode::OpData).with_op1(chain[0]));
        }
        PlaceRoot::StaticProp { class, name } => {
            fb.emit(
                Instruction::new(Opcode::AssignStaticProp)
                    .with_op1(class.op)
                    .with_op2(name)
                    .with_ext(class.mode)
                    .with_flags(flags::PUT_BACK),
            );
            fb.emit(Instruction::new(Opcode::OpData).with_op1(chain[0]));
        }
        PlaceRoot::Var(_) | PlaceRoot::Dynamic(_) => {}
    }
}

pub(crate) fn write_place(fb: &mut FunctionBuilder, node: &AstNode, place: &Place, value: Operand) -> Result<(), CompileError> {
    if place.dims.is_empty() {
        match place.root {
            PlaceRoot::Var(v) => {
                fb.emit(Instruction::new(Opcode::Assign).with_op1(v).with_op2(value));
            }
            PlaceRoot::Dynamic(n) => {
                fb.emit(Instruction::new(Opcode::AssignDynamic).with_op1(n).with_op2(value));
            }
            PlaceRoot::Prop { object, name } => {
                fb.emit(Instruction::new(Opcode::AssignObj).with_op1(object).with_op2(name));
                fb.emit(Instruction::new(Opcode::OpData).with_op1(value));
            }
            PlaceRoot::StaticProp { class, name } => {
                fb.emit(Instruction::new(Opcode::AssignStaticProp).with_op1(class.op).with_op2(name).with_ext(class.mode));
                fb.emit(Instruction::new(Opcode::OpData).with_op1(value));
            }
        }
        return Ok(());
    }
    let n = place.dims.len();
    let chain = fetch_write_chain(fb, node, place, n - 1, false)?;
    emit_assign_dim(fb, chain[n - 1], place.dims[n - 1], value, 0);
    put_back(fb, place, &chain, 0);
    Ok(())
}

/// Read the current value of a place into an operand.
pub(crate) fn read_place(fb: &mut FunctionBuilder, node: &AstNode, place: &Place, quiet: bool) -> Result<Operand, CompileError> {
    let extra = if quiet { flags::QUIET } else { 0 };
    let mut cur = match place.root {
        PlaceRoot::Var(v) => v,
        PlaceRoot::Dynamic(n) => {
            let t = fb.alloc_tmp();
            fb.emit(Instruction::new(Opcode::FetchVar).with_op1(n).with_result(t).with_flags(extra));
            t
        }
        PlaceRoot::Prop { object, name } => {
            let t = fb.alloc_tmp();
            fb.emit(Instruction::new(Opcode::FetchObjR).with_op1(object).with_op2(name).with_result(t).with_flags(extra));
            t
        }
        PlaceRoot::StaticProp { class, name } => {
            let t = fb.alloc_tmp();
            fb.emit(
                Instruction::new(Opcode::FetchStaticPropR)
                    .with_op1(class.op)
                    .with_op2(name)
                    .with_result(t)
                    .with_ext(class.mode)
                    .with_flags(extra),
            );
            t
        }
    };
    for key in &place.dims {
        let Some(k) = key else {
            return Err(invalid(node, "Cannot use [] for reading"));
        };
        let t = fb.alloc_tmp();
        fb.emit(Instruction::new(Opcode::FetchDimR).with_op1(cur).with_op2(*k).with_result(t).with_flags(extra));
        cur = t;
    }
    Ok(cur)
}

pub(crate) fn unset_place(fb: &mut FunctionBuilder, node: &AstNode, place: &Place) -> Result<(), CompileError> {
    if place.dims.is_empty() {
        match place.root {
            PlaceRoot::Var(v) | PlaceRoot::Dynamic(v) => {
                fb.emit(Instruction::new(Opcode::Unset).with_op1(v));
            }
            PlaceRoot::Prop { object, name } => {
                fb.emit(Instruction::new(Opcode::UnsetObj).with_op1(object).with_op2(name));
            }
            PlaceRoot::StaticProp { .. } => {
                return Err(invalid(node, "Attempt to unset static property"));
            }
        }
        return Ok(());
    }
    let n = place.dims.len();
    let Some(last) = place.dims[n - 1] else {
        return Err(invalid(node, "Cannot use [] for unsetting"));
    };
    let chain = fetch_write_chain(fb, node, place, n - 1, true)?;
    fb.emit(Instruction::new(Opcode::UnsetDim).with_op1(chain[n - 1]).with_op2(last));
    put_back(fb, place, &chain, flags::QUIET);
    Ok(())
}

fn lower_assign(cx: &mut LoweringContext, fb: &mut FunctionBuilder, target: &AstNode, value: &AstNode) -> Result<Operand, CompileError> {
    match &target.kind {
        AstNodeKind::List { items } => {
            let v = lower_expr(cx, fb, value)?;
            let src = materialize(fb, v);
            let items: Vec<Option<&ArrayItem>> = items.iter().map(|i| i.as_ref()).collect();
            destructure(cx, fb, target, src, &items)?;
            Ok(src)
        }
        AstNodeKind::ArrayLiteral { items } => {
            let v = lower_expr(cx, fb, value)?;
            let src = materialize(fb, v);
            let items: Vec<Option<&ArrayItem>> = items.iter().map(Some).collect();
            destructure(cx, fb, target, src, &items)?;
            Ok(src)
        }
        _ => {
            let place = lower_place(cx, fb, target)?;
            let v = lower_expr(cx, fb, value)?;
            write_place(fb, target, &place, v)?;
            Ok(v)
        }
    }
}

/// Copy a compiled variable into a temporary so later writes to the same
/// variable do not change the value being destructured.
fn materialize(fb: &mut FunctionBuilder, v: Operand) -> Operand {
    if v.is_variable() {
        let t = fb.alloc_tmp();
        qm_assign(fb, t, v);
        t
    } else {
        v
    }
}

pub(crate) fn destructure(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    node: &AstNode,
    source: Operand,
    items: &[Option<&ArrayItem>],
) -> Result<(), CompileError> {
    for (pos, item) in items.iter().enumerate() {
        let Some(item) = item else { continue };
        if item.by_ref {
            return Err(unsupported(node, "by-reference destructuring is not supported"));
        }
        let key = match &item.key {
            Some(k) => lower_expr(cx, fb, k)?,
            None => fb.int_const(pos as i64),
        };
        let elem = emit_binary(fb, Opcode::FetchDimR, source, key);
        match &item.value.kind {
            AstNodeKind::List { items: nested } => {
                let nested: Vec<Option<&ArrayItem>> = nested.iter().map(|i| i.as_ref()).collect();
                destructure(cx, fb, &item.value, elem, &nested)?;
            }
            AstNodeKind::ArrayLiteral { items: nested } => {
                let nested: Vec<Option<&ArrayItem>> = nested.iter().map(Some).collect();
                destructure(cx, fb, &item.value, elem, &nested)?;
            }
            _ => {
                let place = lower_place(cx, fb, &item.value)?;
                write_place(fb, &item.value, &place, elem)?;
            }
        }
    }
    Ok(())
}

fn lower_assign_ref(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    node: &AstNode,
    target: &AstNode,
    value: &AstNode,
) -> Result<Operand, CompileError> {
    let place = lower_place(cx, fb, target)?;
    let PlaceRoot::Var(t) = place.root else {
        return Err(unsupported(node, "references to array elements and properties are not supported"));
    };
    if !place.dims.is_empty() {
        return Err(unsupported(node, "references to array elements and properties are not supported"));
    }
    match &value.kind {
        AstNodeKind::Variable { .. } | AstNodeKind::VariableVariable { .. } => {
            let src = lower_place(cx, fb, value)?;
            match src.root {
                PlaceRoot::Var(s) if src.dims.is_empty() => {
                    fb.emit(Instruction::new(Opcode::AssignRef).with_op1(t).with_op2(s));
                    Ok(t)
                }
                _ => Err(unsupported(node, "references to array elements and properties are not supported")),
            }
        }
        // `$a = &f()` and `$a = &new C` degrade to a plain assignment
        AstNodeKind::Call { .. } | AstNodeKind::MethodCall { .. } | AstNodeKind::StaticCall { .. } | AstNodeKind::New { .. } => {
            let v = lower_expr(cx, fb, value)?;
            fb.emit(Instruction::new(Opcode::Assign).with_op1(t).with_op2(v));
            Ok(t)
        }
        _ => Err(unsupported(node, "references to array elements and properties are not supported")),
    }
}

fn lower_compound_assign(
    cx: &mut LoweringContext,
    fb: &mut FunctionBuilder,
    op: BinaryOperator,
    target: &AstNode,
    value: &AstNode,
) -> Result<Operand, CompileError> {
    let place = lower_place(cx, fb, target)?;
    if op == BinaryOperator::Coalesce {
        let res = fb.alloc_tmp();
        let end = fb.new_label();
        let cur = read_place(fb, target, &place, true)?;
        fb.emit_branch(Instruction::new(Opcode::Coalesce).with_op1(cur).with_result(res), end);
        let v = lower_expr(cx, fb, value)?;
        write_place(fb, target, &place, v)?;
        qm_assign(fb, res, v);
        fb.bind_label(end);
        return Ok(res);
    }
    let Some(binop) = binary_opcode(op) else {
        return Err(malformed(target, "logical operators cannot be used in compound assignment"));
    };
    let v = lower_expr(cx, fb, value)?;
    let res = fb.alloc_tmp();
    let ext = binop as u8 as u32;
    if place.dims.is_empty() {
        match place.root {
            PlaceRoot::Var(t) => {
                fb.emit(Instruction::new(Opcode::AssignOp).with_op1(t).with_op2(v).with_result(res).with_ext(ext));
            }
            PlaceRoot::Dynamic(_) => {
                let cur = read_place(fb, target, &place, false)?;
                fb.emit(Instruction::new(binop).with_op1(cur).with_op2(v).with_result(res));
                write_place(fb, target, &place, res)?;
            }
            PlaceRoot::Prop { object, name } => {
                fb.emit(Instruction::new(Opcode::AssignObjOp).with_op1(object).with_op2(name).with_result(res));
                fb.emit(Instruction::new(Opcode::OpData).with_op1(v).with_ext(ext));
            }
            PlaceRoot::StaticProp { class, name } => {
                fb.emit(
                    Instruction::new(Opcode::AssignStaticPropOp)
                        .with_op1(class.op)
                        .with_op2(name)
                        .with_result(res)
                        .with_ext(class.mode),
                );
                fb.emit(Instruction::new(Opcode::OpData).with_op1(v).with_ext(ext));
            }
        }
        return Ok(res);
    }
    let n = place.dims.len();
    let chain = fetch_write_chain(fb, target, &place, n - 1, false)?;
    let mut insn = Instruction::new(Opcode::AssignDimOp).with_op1(chain[n - 1]).with_result(res);
    if let Some(k) = place.dims[n - 1] {
        insn = insn.with_op2(k);
    }
    fb.emit(insn);
    fb.emit(Instruction::new(Opcode::OpData).with_op1(v).with_ext(ext));
    put_back(fb, &place, &chain, 0);
    Ok(res)
}

fn lower_inc_dec(cx: &mut LoweringContext, fb: &mut FunctionBuilder, op: IncDecOperator, target: &AstNode) -> Result<Operand, CompileError> {
    let place = lower_place(cx, fb, target)?;
    let res = fb.alloc_tmp();
    if let (PlaceRoot::Var(v), true) = (place.root, place.dims.is_empty()) {
        let opcode = match op {
            IncDecOperator::PreInc => Opcode::PreInc,
            IncDecOperator::PreDec => Opcode::PreDec,
            IncDecOperator::PostInc => Opcode::PostInc,
            IncDecOperator::PostDec => Opcode::PostDec,
        };
        fb.emit(Instruction::new(opcode).with_op1(v).with_result(res));
        return Ok(res);
    }
    let cur = read_place(fb, target, &place, false)?;
    let step = match op {
        IncDecOperator::PreInc | IncDecOperator::PostInc => Opcode::IncValue,
        IncDecOperator::PreDec | IncDecOperator::PostDec => Opcode::DecValue,
    };
    let updated = emit_unary(fb, step, cur);
    write_place(fb, target, &place, updated)?;
    match op {
        IncDecOperator::PreInc | IncDecOperator::PreDec => qm_assign(fb, res, updated),
        IncDecOperator::PostInc | IncDecOperator::PostDec => qm_assign(fb, res, cur),
    }
    Ok(res)
}
