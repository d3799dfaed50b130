//! file: core/src/vm/handlers/mod.rs
//! description: opcode handlers, grouped by the opcode band they serve.
//!
//! Each submodule exposes `register`, which installs its handlers into the
//! dispatch table. A handler reads its operands through the execution
//! context and reports the next step as a `Flow`.

use crate::ir::instruction::{Instruction, Operand, OperandType};
use crate::ir::op::Opcode;

use super::context::ExecutionContext;
use super::error::{EngineFatal, VmError};
use super::exec::{Flow, HandlerTable};
use super::value::Value;

mod arith;
mod arrays;
mod calls;
mod compare;
mod control;
mod decl;
mod exceptions;
mod foreach;
mod generators;
mod objects;
mod tasks;
mod vars;

pub(crate) use foreach::iterate_pairs;
pub(crate) use vars::lookup_constant;

pub(crate) fn register_all(table: &mut HandlerTable) {
    table.set(Opcode::OpData, op_data_marker);
    arith::register(table);
    compare::register(table);
    control::register(table);
    foreach::register(table);
    vars::register(table);
    arrays::register(table);
    objects::register(table);
    calls::register(table);
    decl::register(table);
    exceptions::register(table);
    generators::register(table);
    tasks::register(table);
}

/// `OP_DATA` is consumed by the instruction before it; reaching it on its
/// own is a no-op.
fn op_data_marker(_: &mut ExecutionContext, _: &Instruction) -> Result<Flow, VmError> {
    Ok(Flow::Next)
}

/// The `OP_DATA` following the current instruction.
pub(super) fn op_data(ctx: &ExecutionContext) -> Result<Instruction, VmError> {
    let frame = ctx.frame()?;
    match frame.func.instructions.get(frame.ip + 1) {
        Some(next) if next.opcode == Opcode::OpData => Ok(next.clone()),
        _ => Err(EngineFatal::StackCorruption(format!("missing OP_DATA after ip {} in {}", frame.ip, frame.func.name)).into()),
    }
}

/// A property, method or variable name: a string constant, or any value
/// converted to string.
pub(super) fn member_name(ctx: &mut ExecutionContext, op: Operand) -> Result<String, VmError> {
    if op.kind == OperandType::Const {
        if let Ok(s) = ctx.const_string(op) {
            return Ok(s);
        }
    }
    let v = ctx.read(op)?;
    Ok(match v {
        Value::String(s) => s.to_string_lossy().into_owned(),
        other => ctx.to_string(&other)?.to_string_lossy().into_owned(),
    })
}

/// Store an optional result.
pub(super) fn set_result(ctx: &mut ExecutionContext, insn: &Instruction, v: Value) -> Result<(), VmError> {
    let result = insn.result();
    if result.is_unused() {
        return Ok(());
    }
    ctx.write(result, v)
}
