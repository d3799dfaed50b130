//! file: core/src/vm/handlers/exceptions.rs
//! description: `throw`, catch clause matching and finally completion.
//!
//! Unwinding itself lives in the dispatch loop. It parks the exception on
//! the frame and jumps to the first `CATCH` of the region; each clause either
//! claims it or jumps to the next, and the trailing `RETHROW` sends an
//! unclaimed exception on its way.

use crate::ir::instruction::Instruction;
use crate::ir::op::Opcode;

use crate::vm::context::ExecutionContext;
use crate::vm::error::VmError;
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::value::Value;

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::Throw, throw);
    table.set(Opcode::Catch, catch);
    table.set(Opcode::Rethrow, rethrow);
    table.set(Opcode::FinallyEnd, finally_end);
}

fn throw(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    match ctx.read(insn.op1())? {
        Value::Object(o) if o.class().is_a("Throwable") => Err(VmError::Thrown(o)),
        _ => Err(VmError::error("Can only throw objects")),
    }
}

fn catch(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let class = ctx.const_string(insn.op1())?;
    let class = class.trim_start_matches('\\');
    let claimed = match &ctx.frame()?.exception {
        Some(exc) => exc.class().is_a(class),
        None => false,
    };
    if !claimed {
        return Ok(Flow::Jump(insn.op2 as usize));
    }
    let exc = ctx.frame_mut()?.exception.take();
    if let Some(exc) = exc {
        log::debug!("caught {} as {}", exc.class().name, class);
        let var = insn.result();
        if !var.is_unused() {
            ctx.write(var, Value::Object(exc))?;
        }
    }
    Ok(Flow::Next)
}

fn rethrow(ctx: &mut ExecutionContext, _: &Instruction) -> Result<Flow, VmError> {
    match ctx.frame_mut()?.exception.take() {
        Some(exc) => Err(VmError::Thrown(exc)),
        None => Ok(Flow::Next),
    }
}

fn finally_end(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    ctx.finish_finally(insn.op1)
}
