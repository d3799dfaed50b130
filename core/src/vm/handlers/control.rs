//! file: core/src/vm/handlers/control.rs
//! description: jumps, returns, output and script termination.

use crate::ir::instruction::Instruction;
use crate::ir::op::Opcode;

use crate::vm::context::ExecutionContext;
use crate::vm::convert::{scalar_to_string, to_bool};
use crate::vm::error::VmError;
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::value::Value;

use super::set_result;

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::Jmp, jmp);
    table.set(Opcode::JmpZ, jmpz);
    table.set(Opcode::JmpNz, jmpnz);
    table.set(Opcode::JmpNull, jmp_null);
    table.set(Opcode::Coalesce, coalesce);
    table.set(Opcode::JmpSkipDefault, jmp_skip_default);
    table.set(Opcode::JmpFinally, jmp_finally);
    table.set(Opcode::Return, ret);
    table.set(Opcode::Echo, echo);
    table.set(Opcode::Exit, exit);
    table.set(Opcode::MatchError, match_error);
}

fn jmp(_: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    Ok(Flow::Jump(insn.op1 as usize))
}

fn jmpz(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let cond = ctx.read(insn.op1())?;
    Ok(if to_bool(&cond) { Flow::Next } else { Flow::Jump(insn.op2 as usize) })
}

fn jmpnz(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let cond = ctx.read(insn.op1())?;
    Ok(if to_bool(&cond) { Flow::Jump(insn.op2 as usize) } else { Flow::Next })
}

fn jmp_null(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    match ctx.read_quiet(insn.op1())? {
        Some(v) if !v.is_null() => Ok(Flow::Next),
        _ => {
            set_result(ctx, insn, Value::Null)?;
            Ok(Flow::Jump(insn.op2 as usize))
        }
    }
}

fn coalesce(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    match ctx.read_quiet(insn.op1())? {
        Some(v) if !v.is_null() => {
            set_result(ctx, insn, v)?;
            Ok(Flow::Jump(insn.op2 as usize))
        }
        _ => Ok(Flow::Next),
    }
}

fn jmp_skip_default(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let passed = ctx.frame()?.passed.get(insn.op1 as usize).copied().unwrap_or(false);
    Ok(if passed { Flow::Jump(insn.op2 as usize) } else { Flow::Next })
}

fn jmp_finally(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    ctx.transfer_to(insn.op1 as usize)
}

fn ret(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let v = ctx.check_return(v)?;
    ctx.begin_return(v)
}

fn echo(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    ctx.echo_value(&v)?;
    Ok(Flow::Next)
}

fn exit(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    if insn.op1().is_unused() {
        return Err(VmError::Exit(0));
    }
    match ctx.read(insn.op1())? {
        Value::Int(code) => Err(VmError::Exit(code)),
        other => {
            ctx.echo_value(&other)?;
            Err(VmError::Exit(0))
        }
    }
}

fn match_error(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let shown = match &v {
        Value::String(s) => format!("\"{}\"", s.to_string_lossy()),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Null => "NULL".to_string(),
        Value::Int(_) | Value::Float(_) => scalar_to_string(&v).map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
        other => format!("of type {}", other.type_name()),
    };
    Err(VmError::raise("UnhandledMatchError", format!("Unhandled match case {}", shown)))
}
