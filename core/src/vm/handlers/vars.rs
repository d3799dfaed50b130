//! file: core/src/vm/handlers/vars.rs
//! description: variable assignment, references, globals, statics and
//! constant lookup.

use std::sync::Arc;

use crate::ir::instruction::{flags, Instruction};
use crate::ir::op::Opcode;

use crate::vm::arith;
use crate::vm::context::ExecutionContext;
use crate::vm::error::{EngineFatal, VmError};
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::value::{Value, VarRef};

use super::{member_name, set_result};

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::Assign, assign);
    table.set(Opcode::AssignRef, assign_ref);
    table.set(Opcode::AssignOp, assign_op);
    table.set(Opcode::PreInc, pre_inc);
    table.set(Opcode::PreDec, pre_dec);
    table.set(Opcode::PostInc, post_inc);
    table.set(Opcode::PostDec, post_dec);
    table.set(Opcode::FetchVar, fetch_var);
    table.set(Opcode::AssignDynamic, assign_dynamic);
    table.set(Opcode::Unset, unset);
    table.set(Opcode::BindGlobal, bind_global);
    table.set(Opcode::BindStatic, bind_static);
    table.set(Opcode::FetchConstant, fetch_constant);
}

/// Binary opcode carried in `extended_value` by the compound assignments.
pub(super) fn binary_of(ext: u32) -> Result<Opcode, VmError> {
    u8::try_from(ext)
        .ok()
        .and_then(Opcode::from_u8)
        .ok_or_else(|| EngineFatal::TypeIncompatible(format!("{} is not a binary opcode", ext)).into())
}

fn assign(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op2())?;
    if insn.result().is_unused() {
        ctx.write(insn.op1(), v)?;
    } else {
        ctx.write(insn.op1(), v.clone())?;
        set_result(ctx, insn, v)?;
    }
    Ok(Flow::Next)
}

fn assign_ref(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let cell = ctx.cv_ref(insn.op2())?;
    ctx.bind_ref(insn.op1(), cell)?;
    Ok(Flow::Next)
}

fn assign_op(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let op = binary_of(insn.extended_value)?;
    let current = ctx.read(insn.op1())?;
    let rhs = ctx.read(insn.op2())?;
    let v = ctx.binary(op, &current, &rhs)?;
    ctx.write(insn.op1(), v.clone())?;
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

fn step(ctx: &mut ExecutionContext, insn: &Instruction, up: bool, pre: bool) -> Result<Flow, VmError> {
    let old = ctx.read(insn.op1())?;
    let new = if up { arith::increment(&old)? } else { arith::decrement(&old)? };
    ctx.write(insn.op1(), new.clone())?;
    set_result(ctx, insn, if pre { new } else { old })?;
    Ok(Flow::Next)
}

fn pre_inc(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    step(ctx, insn, true, true)
}

fn pre_dec(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    step(ctx, insn, false, true)
}

fn post_inc(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    step(ctx, insn, true, false)
}

fn post_dec(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    step(ctx, insn, false, false)
}

fn fetch_var(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let name = member_name(ctx, insn.op1())?;
    let v = ctx.read_named(&name, insn.has_flag(flags::QUIET))?;
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

fn assign_dynamic(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let name = member_name(ctx, insn.op1())?;
    let v = ctx.read(insn.op2())?;
    ctx.write_named(&name, v.clone())?;
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

fn unset(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    ctx.unset_var(insn.op1())?;
    Ok(Flow::Next)
}

fn bind_global(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let name = ctx.const_string(insn.op2())?;
    let cell = ctx.globals.entry(&name);
    ctx.bind_ref(insn.op1(), cell)?;
    Ok(Flow::Next)
}

fn bind_static(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let func = Arc::clone(&ctx.frame()?.func);
    let key = (Arc::as_ptr(&func) as usize, insn.extended_value);
    let cell = match ctx.classes.statics.get(&key) {
        Some(cell) => cell.clone(),
        None => {
            let init = ctx.read(insn.op2())?;
            let cell = VarRef::new(init);
            ctx.classes.statics.insert(key, cell.clone());
            cell
        }
    };
    ctx.bind_ref(insn.op1(), cell)?;
    Ok(Flow::Next)
}

/// Run-time constant lookup: `define()`d and declared constants first, then
/// engine constants. A namespaced name falls back to its global form.
pub(crate) fn lookup_constant(ctx: &ExecutionContext, name: &str) -> Option<Value> {
    let name = name.trim_start_matches('\\');
    let find = |n: &str| ctx.classes.constants.get(n).cloned().or_else(|| ctx.registry.constant(n).cloned());
    find(name).or_else(|| name.rsplit_once('\\').and_then(|(_, short)| find(short)))
}

fn fetch_constant(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let name = ctx.const_string(insn.op1())?;
    match lookup_constant(ctx, &name) {
        Some(v) => {
            set_result(ctx, insn, v)?;
            Ok(Flow::Next)
        }
        None => Err(VmError::error(format!("Undefined constant \"{}\"", name.trim_start_matches('\\')))),
    }
}
