//! file: core/src/vm/handlers/arith.rs
//! description: arithmetic, unary and conversion opcodes.

use indexmap::IndexMap;

use crate::ir::instruction::{cast, Instruction};
use crate::ir::op::Opcode;

use crate::vm::arith;
use crate::vm::array::PhpArray;
use crate::vm::context::ExecutionContext;
use crate::vm::convert::{to_bool, to_float, to_int};
use crate::vm::error::{EngineFatal, VmError};
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::object::ObjectRef;
use crate::vm::value::Value;

use super::set_result;

pub(super) fn register(table: &mut HandlerTable) {
    for op in [
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::Concat,
        Opcode::BitAnd,
        Opcode::BitOr,
        Opcode::BitXor,
        Opcode::Shl,
        Opcode::Shr,
    ] {
        table.set(op, binary);
    }
    table.set(Opcode::BitNot, bit_not);
    table.set(Opcode::BoolNot, bool_not);
    table.set(Opcode::Neg, neg);
    table.set(Opcode::Plus, plus);
    table.set(Opcode::Bool, boolean);
    table.set(Opcode::Cast, cast_value);
    table.set(Opcode::QmAssign, qm_assign);
    table.set(Opcode::IncValue, inc_value);
    table.set(Opcode::DecValue, dec_value);
    table.set(Opcode::Nop, nop);
}

fn nop(_: &mut ExecutionContext, _: &Instruction) -> Result<Flow, VmError> {
    Ok(Flow::Next)
}

fn binary(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let a = ctx.read(insn.op1())?;
    let b = ctx.read(insn.op2())?;
    let v = ctx.binary(insn.opcode, &a, &b)?;
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

fn bit_not(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    set_result(ctx, insn, arith::bit_not(&v)?)?;
    Ok(Flow::Next)
}

fn bool_not(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    set_result(ctx, insn, Value::Bool(!to_bool(&v)))?;
    Ok(Flow::Next)
}

fn neg(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let out = arith::negate(&v, ctx)?;
    set_result(ctx, insn, out)?;
    Ok(Flow::Next)
}

fn plus(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let out = arith::unary_plus(&v, ctx)?;
    set_result(ctx, insn, out)?;
    Ok(Flow::Next)
}

fn boolean(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    set_result(ctx, insn, Value::Bool(to_bool(&v)))?;
    Ok(Flow::Next)
}

fn qm_assign(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

fn inc_value(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    set_result(ctx, insn, arith::increment(&v)?)?;
    Ok(Flow::Next)
}

fn dec_value(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    set_result(ctx, insn, arith::decrement(&v)?)?;
    Ok(Flow::Next)
}

fn cast_value(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let out = match insn.extended_value {
        cast::INT => Value::Int(to_int(&v)),
        cast::FLOAT => Value::Float(to_float(&v)),
        cast::STRING => Value::String(ctx.to_string(&v)?),
        cast::BOOL => Value::Bool(to_bool(&v)),
        cast::ARRAY => Value::Array(to_array(ctx, v)),
        cast::OBJECT => Value::Object(to_object(ctx, v)?),
        cast::UNSET => Value::Null,
        other => return Err(EngineFatal::TypeIncompatible(format!("unknown cast kind {}", other)).into()),
    };
    set_result(ctx, insn, out)?;
    Ok(Flow::Next)
}

fn to_array(ctx: &ExecutionContext, v: Value) -> PhpArray {
    match v {
        Value::Null => PhpArray::new(),
        Value::Array(a) => a,
        Value::Object(o) => ctx.object_to_array(&o),
        scalar => PhpArray::from_list([scalar]),
    }
}

fn to_object(ctx: &mut ExecutionContext, v: Value) -> Result<ObjectRef, VmError> {
    let class = ctx.class_by_name("stdClass")?;
    let props: IndexMap<String, Option<Value>> = match v {
        Value::Object(o) => return Ok(o),
        Value::Null => IndexMap::new(),
        Value::Array(a) => a.iter().map(|(k, v)| (k.to_string(), Some(v.clone()))).collect(),
        scalar => IndexMap::from([("scalar".to_string(), Some(scalar))]),
    };
    Ok(ObjectRef::new(class, props))
}
