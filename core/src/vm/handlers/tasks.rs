//! file: core/src/vm/handlers/tasks.rs
//! description: `await` on task handles.

use crate::ir::instruction::Instruction;
use crate::ir::op::Opcode;

use crate::vm::array::PhpArray;
use crate::vm::concurrency;
use crate::vm::context::ExecutionContext;
use crate::vm::error::VmError;
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::value::Value;

use super::set_result;

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::Await, await_value);
}

/// `await $task` joins one task. `await [$a, $b]` joins each in key order
/// and keeps the keys.
fn await_value(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let out = match &v {
        Value::Task(task) => concurrency::await_task(task)?,
        Value::Array(tasks) => {
            let mut results = PhpArray::with_capacity(tasks.len());
            for (k, t) in tasks.iter() {
                let Value::Task(task) = t else {
                    return Err(VmError::type_error(format!("Cannot await a value of type {}", t.type_name())));
                };
                results.insert(k.clone(), concurrency::await_task(task)?);
            }
            Value::Array(results)
        }
        other => return Err(VmError::type_error(format!("Cannot await a value of type {}", other.type_name()))),
    };
    set_result(ctx, insn, out)?;
    Ok(Flow::Next)
}
