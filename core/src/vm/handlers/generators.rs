//! file: core/src/vm/handlers/generators.rs
//! description: `yield` and `yield from`.
//!
//! A yielding instruction runs twice. The first time it suspends the frame
//! without advancing; when the generator is resumed the same instruction
//! sees `frame.resumed` and completes with the sent value (or throws).

use crate::ir::instruction::Instruction;
use crate::ir::op::Opcode;

use crate::vm::context::ExecutionContext;
use crate::vm::error::VmError;
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::frame::{Delegate, Resume};
use crate::vm::generator::{self, GenState};
use crate::vm::value::Value;

use super::set_result;

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::Yield, yield_value);
    table.set(Opcode::YieldFrom, yield_from);
}

fn yield_value(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    if let Some(how) = ctx.frame_mut()?.resumed.take() {
        let sent = match how {
            Resume::Next => Value::Null,
            Resume::Send(v) => v,
            Resume::Throw(e) => return Err(VmError::Thrown(e)),
        };
        set_result(ctx, insn, sent)?;
        return Ok(Flow::Next);
    }
    let value = if insn.op1().is_unused() { Value::Null } else { ctx.read(insn.op1())? };
    let key = if insn.op2().is_unused() {
        let frame = ctx.frame_mut()?;
        let k = frame.auto_key;
        frame.auto_key += 1;
        Value::Int(k)
    } else {
        let k = ctx.read(insn.op2())?;
        if let Value::Int(i) = k {
            let frame = ctx.frame_mut()?;
            if i >= frame.auto_key {
                frame.auto_key = i.saturating_add(1);
            }
        }
        k
    };
    Ok(Flow::Suspend { key, value })
}

fn start_delegate(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Delegate, VmError> {
    match ctx.read(insn.op1())? {
        Value::Array(array) => Ok(Delegate::Array { array, pos: 0 }),
        Value::Object(o) if o.generator().is_some() => {
            generator::ensure_started(ctx, &o)?;
            Ok(Delegate::Generator(o))
        }
        _ => Err(VmError::error("Can use \"yield from\" only with arrays and Traversables")),
    }
}

/// Delegate to an inner array or generator. Each resumption of the outer
/// generator is forwarded to the inner one; the expression's value is the
/// inner generator's return value.
fn yield_from(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let resumed = ctx.frame_mut()?.resumed.take();
    let (delegate, first) = match ctx.frame_mut()?.delegate.take() {
        Some(d) => (d, false),
        None => (start_delegate(ctx, insn)?, true),
    };
    match delegate {
        Delegate::Array { array, pos } => {
            if let (false, Some(Resume::Throw(e))) = (first, resumed) {
                return Err(VmError::Thrown(e));
            }
            let Some((k, v)) = array.get_index(pos).map(|(k, v)| (k.to_value(), v.clone())) else {
                set_result(ctx, insn, Value::Null)?;
                return Ok(Flow::Next);
            };
            ctx.frame_mut()?.delegate = Some(Delegate::Array { array, pos: pos + 1 });
            Ok(Flow::Suspend { key: k, value: v })
        }
        Delegate::Generator(inner) => {
            if !first {
                generator::resume(ctx, &inner, Some(resumed.unwrap_or(Resume::Next)))?;
            }
            if generator::state(&inner)? == GenState::Finished {
                let ret = generator::return_value(&inner)?.unwrap_or_default();
                set_result(ctx, insn, ret)?;
                return Ok(Flow::Next);
            }
            let (k, v) = generator::current_pair(&inner)?.unwrap_or_default();
            ctx.frame_mut()?.delegate = Some(Delegate::Generator(inner));
            Ok(Flow::Suspend { key: k, value: v })
        }
    }
}
