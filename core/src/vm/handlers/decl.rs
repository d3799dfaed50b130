//! file: core/src/vm/handlers/decl.rs
//! description: closure creation, lexical binding and `const` declarations.

use std::sync::Arc;

use crate::ir::instruction::{flags, Instruction};
use crate::ir::op::Opcode;

use crate::vm::context::ExecutionContext;
use crate::vm::error::{EngineFatal, VmError};
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::frame::Slot;
use crate::vm::value::{Closure, Value};

use super::set_result;

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::CreateClosure, create_closure);
    table.set(Opcode::BindLexical, bind_lexical);
    table.set(Opcode::DeclareConst, declare_const);
}

fn create_closure(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame()?;
    let Some(func) = frame.func.closures.get(insn.op1 as usize).cloned() else {
        return Err(EngineFatal::StackCorruption(format!("no closure body {} in {}", insn.op1, frame.func.name)).into());
    };
    let mut closure = Closure::new(Arc::clone(&func));
    if !func.flags.is_static {
        closure.this = frame.this.clone();
    }
    closure.scope = frame.scope.clone();
    closure.static_class = frame.static_class.clone();
    if closure.scope.is_none() {
        closure.scope = func.scope_name.as_deref().and_then(|n| ctx.registry.class(n));
    }
    set_result(ctx, insn, Value::Callable(Arc::new(closure)))?;
    Ok(Flow::Next)
}

/// Capture one `use` variable into the closure in `op1`. `BY_REF` shares
/// the parent's cell; `QUIET` is an arrow function's implicit capture,
/// which skips variables the parent never defined.
fn bind_lexical(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let slot = if insn.has_flag(flags::BY_REF) {
        Slot::Ref(ctx.cv_ref(insn.op2())?)
    } else if insn.has_flag(flags::QUIET) {
        match ctx.read_quiet(insn.op2())? {
            Some(v) => Slot::Val(v),
            None => return Ok(Flow::Next),
        }
    } else {
        Slot::Val(ctx.read(insn.op2())?)
    };
    let child = insn.extended_value;
    ctx.modify(insn.op1(), |_, v| match v {
        Value::Callable(c) => {
            Arc::make_mut(c).captured.push((child, slot));
            Ok(())
        }
        other => Err(EngineFatal::TypeIncompatible(format!("cannot bind a variable into {}", other.type_name())).into()),
    })?;
    Ok(Flow::Next)
}

fn declare_const(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let name = ctx.const_string(insn.op1())?;
    let v = ctx.read(insn.op2())?;
    if ctx.classes.constants.contains_key(&name) || ctx.registry.constant(&name).is_some() {
        ctx.warn(&format!("Constant {} already defined", name));
        return Ok(Flow::Next);
    }
    ctx.classes.constants.insert(name, v);
    Ok(Flow::Next)
}
