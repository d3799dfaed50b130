//! file: core/src/vm/handlers/compare.rs
//! description: comparison, type test and isset/empty opcodes.

use crate::ir::instruction::{class_ref, Instruction};
use crate::ir::op::Opcode;

use crate::vm::compare;
use crate::vm::context::ExecutionContext;
use crate::vm::convert::to_bool;
use crate::vm::error::VmError;
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::value::Value;

use super::set_result;

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::IsEqual, is_equal);
    table.set(Opcode::IsNotEqual, is_not_equal);
    table.set(Opcode::IsIdentical, is_identical);
    table.set(Opcode::IsNotIdentical, is_not_identical);
    table.set(Opcode::IsSmaller, is_smaller);
    table.set(Opcode::IsSmallerOrEqual, is_smaller_or_equal);
    table.set(Opcode::Spaceship, spaceship);
    table.set(Opcode::BoolXor, bool_xor);
    table.set(Opcode::Instanceof, instance_of);
    table.set(Opcode::IssetCheck, isset_check);
    table.set(Opcode::EmptyCheck, empty_check);
}

fn operands(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<(Value, Value), VmError> {
    let a = ctx.read(insn.op1())?;
    let b = ctx.read(insn.op2())?;
    Ok((a, b))
}

fn is_equal(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Bool(compare::loose_eq(&a, &b)))?;
    Ok(Flow::Next)
}

fn is_not_equal(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Bool(!compare::loose_eq(&a, &b)))?;
    Ok(Flow::Next)
}

fn is_identical(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Bool(compare::identical(&a, &b)))?;
    Ok(Flow::Next)
}

fn is_not_identical(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Bool(!compare::identical(&a, &b)))?;
    Ok(Flow::Next)
}

fn is_smaller(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Bool(compare::is_smaller(&a, &b)))?;
    Ok(Flow::Next)
}

fn is_smaller_or_equal(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Bool(compare::is_smaller_or_equal(&a, &b)))?;
    Ok(Flow::Next)
}

fn spaceship(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Int(compare::spaceship(&a, &b)))?;
    Ok(Flow::Next)
}

fn bool_xor(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (a, b) = operands(ctx, insn)?;
    set_result(ctx, insn, Value::Bool(to_bool(&a) != to_bool(&b)))?;
    Ok(Flow::Next)
}

fn instance_of(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let mode = insn.extended_value;
    // an unknown class name is simply not matched
    let class = if mode == class_ref::NAMED {
        let name = ctx.const_string(insn.op2())?;
        ctx.registry.class(&name)
    } else {
        Some(ctx.resolve_class_operand(insn.op2(), mode)?)
    };
    let out = match (&v, class) {
        (Value::Object(o), Some(c)) => o.class().is_subclass_of(&c),
        (Value::Callable(_), Some(c)) => c.name == "Closure",
        _ => false,
    };
    set_result(ctx, insn, Value::Bool(out))?;
    Ok(Flow::Next)
}

fn isset_check(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let set = ctx.read_quiet(insn.op1())?.is_some_and(|v| !v.is_null());
    set_result(ctx, insn, Value::Bool(set))?;
    Ok(Flow::Next)
}

fn empty_check(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let empty = ctx.read_quiet(insn.op1())?.is_none_or(|v| !to_bool(&v));
    set_result(ctx, insn, Value::Bool(empty))?;
    Ok(Flow::Next)
}
