//! file: core/src/vm/handlers/calls.rs
//! description: call setup, argument passing and invocation.
//!
//! An `INIT_*` opcode pushes a `PendingCall` onto the frame, the `SEND_*`
//! opcodes fill in its arguments and `DO_CALL` (or `SPAWN`) pops it.

use crate::ir::instruction::{class_ref, Instruction};
use crate::ir::op::Opcode;

use crate::vm::concurrency;
use crate::vm::context::ExecutionContext;
use crate::vm::error::{EngineFatal, VmError};
use crate::vm::exec::{Flow, HandlerTable, Started};
use crate::vm::frame::{Arg, CallTarget, PendingCall};
use crate::vm::value::Value;

use super::foreach::iterate_pairs;
use super::{member_name, set_result};

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::InitFcall, init_fcall);
    table.set(Opcode::InitDynamicCall, init_dynamic_call);
    table.set(Opcode::InitMethodCall, init_method_call);
    table.set(Opcode::InitStaticCall, init_static_call);
    table.set(Opcode::New, new_object);
    table.set(Opcode::SendVal, send_val);
    table.set(Opcode::SendVar, send_var);
    table.set(Opcode::SendNamed, send_named);
    table.set(Opcode::SendUnpack, send_unpack);
    table.set(Opcode::DoCall, do_call);
    table.set(Opcode::Spawn, spawn);
}

fn push_call(ctx: &mut ExecutionContext, mut call: PendingCall, argc: u32) -> Result<Flow, VmError> {
    call.args.reserve(argc as usize);
    ctx.frame_mut()?.pending_calls.push(call);
    Ok(Flow::Next)
}

fn pending(ctx: &mut ExecutionContext) -> Result<&mut PendingCall, VmError> {
    ctx.frame_mut()?
        .pending_calls
        .last_mut()
        .ok_or_else(|| EngineFatal::StackCorruption("argument sent without a pending call".into()).into())
}

fn pop_pending(ctx: &mut ExecutionContext) -> Result<PendingCall, VmError> {
    ctx.frame_mut()?
        .pending_calls
        .pop()
        .ok_or_else(|| EngineFatal::StackCorruption("call finished without a pending call".into()).into())
}

/// Named function call. An unqualified name inside a namespace falls back
/// to the global function.
fn init_fcall(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let name = ctx.const_string(insn.op2())?;
    let call = match ctx.function_call(&name) {
        Ok(call) => call,
        Err(e) => match name.rsplit_once('\\') {
            Some((_, short)) => ctx.function_call(short).map_err(|_| e)?,
            None => return Err(e),
        },
    };
    push_call(ctx, call, insn.extended_value)
}

fn init_dynamic_call(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let callee = ctx.read(insn.op1())?;
    let call = ctx.callable_to_call(&callee)?;
    push_call(ctx, call, insn.extended_value)
}

fn init_method_call(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let target = ctx.read(insn.op1())?;
    let name = member_name(ctx, insn.op2())?;
    let call = match &target {
        Value::Object(o) => ctx.method_call(o, &name, true)?,
        Value::Callable(_) | Value::Task(_) | Value::WaitGroup(_) => {
            PendingCall::new(CallTarget::ValueMethod { receiver: target.clone(), name: name.clone() }, name)
        }
        other => {
            return Err(VmError::error(format!("Call to a member function {}() on {}", name, other.type_name())));
        }
    };
    push_call(ctx, call, insn.extended_value)
}

fn init_static_call(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let mode = insn.extended_value;
    let class = ctx.resolve_class_operand(insn.op1(), mode)?;
    let name = member_name(ctx, insn.op2())?;
    let forward = matches!(mode, class_ref::SELF | class_ref::PARENT | class_ref::STATIC);
    let call = ctx.static_method_call(&class, &name, forward)?;
    push_call(ctx, call, 0)
}

/// `new C(...)`: the instance is the result, the constructor is the
/// pending call completed by the following `DO_CALL`.
fn new_object(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let class = ctx.resolve_class_operand(insn.op1(), insn.extended_value)?;
    let obj = ctx.instantiate(&class)?;
    set_result(ctx, insn, Value::Object(obj.clone()))?;
    let call = match ctx.registry.find_method(&class, "__construct") {
        Some(ctor) => {
            ctx.check_method_visibility(&ctor, &class)?;
            ctx.method_call(&obj, "__construct", false)?
        }
        None => PendingCall::new(CallTarget::None, class.name.clone()),
    };
    push_call(ctx, call, 0)
}

fn send_val(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    pending(ctx)?.args.push(Arg::Val(v));
    Ok(Flow::Next)
}

/// A variable argument goes by reference when the callee declares the
/// parameter `&$x`.
fn send_var(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let by_ref = {
        let call = pending(ctx)?;
        call.param_by_ref(call.args.len())
    };
    let arg = if by_ref { Arg::Ref(ctx.cv_ref(insn.op1())?) } else { Arg::Val(ctx.read(insn.op1())?) };
    pending(ctx)?.args.push(arg);
    Ok(Flow::Next)
}

fn send_named(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let name = ctx.const_string(insn.op2())?;
    pending(ctx)?.named.push((name, Arg::Val(v)));
    Ok(Flow::Next)
}

/// `f(...$xs)`: integer keys become positional arguments, string keys
/// named ones.
fn send_unpack(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let Some(pairs) = iterate_pairs(ctx, v)? else {
        return Err(VmError::type_error("Only arrays and Traversables can be unpacked"));
    };
    let call = pending(ctx)?;
    for (k, v) in pairs {
        match k {
            Value::String(name) => call.named.push((name.to_string_lossy().into_owned(), Arg::Val(v))),
            _ => {
                if !call.named.is_empty() {
                    return Err(VmError::error("Cannot use positional argument after named argument during unpacking"));
                }
                call.args.push(Arg::Val(v));
            }
        }
    }
    Ok(Flow::Next)
}

fn do_call(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let call = pop_pending(ctx)?;
    log::trace!("call {}", call.name);
    match ctx.start_call(call)? {
        Started::Frame(mut frame) => {
            let result = insn.result();
            frame.return_to = if result.is_unused() { None } else { Some(result) };
            Ok(Flow::Call(Box::new(frame)))
        }
        Started::Done(v) => {
            set_result(ctx, insn, v)?;
            Ok(Flow::Next)
        }
    }
}

/// `spawn f(...)`: run the pending call as a task and hand back its handle.
fn spawn(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let call = pop_pending(ctx)?;
    let task = concurrency::spawn(ctx, call)?;
    set_result(ctx, insn, Value::Task(task))?;
    Ok(Flow::Next)
}
