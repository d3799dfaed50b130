//! file: core/src/vm/exec.rs
//! description: the dispatch loop, unwinding and frame construction.
//!
//! `run_frames` executes until the frame that sits at `base` returns or
//! suspends. Every instruction dispatches through a 256-entry handler table
//! indexed by opcode; a handler reports what the loop should do next as a
//! `Flow`. Guest exceptions unwind through try regions here, and completions
//! parked on a `finally` block are resumed by `FINALLY_END`.

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::ir::function::{CompiledFunction, ParamDefault, TypeHint, Zone};
use crate::ir::instruction::Instruction;
use crate::ir::op::Opcode;

use super::array::{ArrayKey, PhpArray};
use super::context::ExecutionContext;
use super::error::{EngineFatal, VmError};
use super::frame::{Arg, CallFrame, CallTarget, Completion, PendingCall, Slot};
use super::generator;
use super::handlers;
use super::native::CallContext;
use super::object::ObjectRef;
use super::registry::RuntimeClass;
use super::value::Value;

/// What the dispatch loop does after a handler returns.
#[derive(Debug)]
pub(crate) enum Flow {
    Next,
    /// Skip the trailing `OP_DATA` as well.
    NextWithData,
    Jump(usize),
    Call(Box<CallFrame>),
    Return(Value),
    Suspend { key: Value, value: Value },
}

#[derive(Debug)]
pub(crate) enum Exit {
    Returned(Value),
    /// A generator frame yielded: (frame, key, value).
    Suspended(Box<CallFrame>, Value, Value),
}

pub(crate) enum Started {
    Frame(CallFrame),
    Done(Value),
}

pub(crate) type Handler = fn(&mut ExecutionContext, &Instruction) -> Result<Flow, VmError>;

fn unimplemented(_: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    Err(EngineFatal::UnimplementedOpcode(insn.opcode.name().to_string()).into())
}

/// Opcode-indexed dispatch table. Unfilled entries raise
/// `UnimplementedOpcode`.
pub(crate) struct HandlerTable {
    handlers: [Handler; 256],
    registered: [bool; 256],
}

impl HandlerTable {
    fn new() -> Self {
        HandlerTable { handlers: [unimplemented; 256], registered: [false; 256] }
    }

    pub(crate) fn set(&mut self, op: Opcode, handler: Handler) {
        self.handlers[op.as_index()] = handler;
        self.registered[op.as_index()] = true;
    }

    fn get(&self, op: Opcode) -> Handler {
        self.handlers[op.as_index()]
    }
}

fn build_table() -> HandlerTable {
    let mut table = HandlerTable::new();
    handlers::register_all(&mut table);
    table
}

lazy_static! {
    static ref HANDLERS: HandlerTable = build_table();
}

/// Whether the dispatch table has a handler for `op`.
pub fn is_implemented(op: Opcode) -> bool {
    HANDLERS.registered[op.as_index()]
}

impl ExecutionContext {
    /// Run until the frame at stack position `base` returns or suspends.
    pub(crate) fn run_frames(&mut self, base: usize) -> Result<Exit, VmError> {
        loop {
            self.steps += 1;
            if let Some(max) = self.options.max_steps {
                if self.steps > max {
                    self.stack.truncate(base);
                    return Err(EngineFatal::StepLimitExceeded(max).into());
                }
            }
            let (func, ip) = {
                let frame = self.stack.top()?;
                (Arc::clone(&frame.func), frame.ip)
            };
            let Some(insn) = func.instructions.get(ip) else {
                self.stack.truncate(base);
                return Err(EngineFatal::StackCorruption(format!("ip {} past the end of {}", ip, func.name)).into());
            };
            if self.options.trace {
                log::trace!("{}:{:04} {}", func.name, ip, insn);
            }

            match HANDLERS.get(insn.opcode)(self, insn) {
                Ok(Flow::Next) => self.stack.top_mut()?.ip += 1,
                Ok(Flow::NextWithData) => self.stack.top_mut()?.ip += 2,
                Ok(Flow::Jump(target)) => self.stack.top_mut()?.ip = target,
                Ok(Flow::Call(frame)) => {
                    self.stack.top_mut()?.ip += 1;
                    if let Err(e) = self.stack.push(*frame) {
                        self.stack.truncate(base);
                        return Err(e);
                    }
                }
                Ok(Flow::Return(v)) => {
                    let done = self.stack.pop();
                    if self.stack.len() <= base {
                        return Ok(Exit::Returned(v));
                    }
                    if let Some(to) = done.and_then(|f| f.return_to) {
                        self.write(to, v)?;
                    }
                }
                Ok(Flow::Suspend { key, value }) => {
                    let frame = self
                        .stack
                        .pop()
                        .ok_or_else(|| EngineFatal::StackCorruption("yield without a frame".into()))?;
                    return Ok(Exit::Suspended(Box::new(frame), key, value));
                }
                Err(VmError::Raise { class, message }) => match self.create_exception(&class, &message) {
                    Ok(exc) => self.unwind(base, exc)?,
                    Err(e) => {
                        self.stack.truncate(base);
                        return Err(e);
                    }
                },
                Err(VmError::Thrown(exc)) => self.unwind(base, exc)?,
                Err(e) => {
                    self.stack.truncate(base);
                    return Err(e);
                }
            }
        }
    }

    /// Route a thrown exception to the nearest catch or finally block,
    /// dropping frames that have none. Fails once the stack above `base` is
    /// exhausted.
    fn unwind(&mut self, base: usize, exc: ObjectRef) -> Result<(), VmError> {
        let mut innermost = true;
        while self.stack.len() > base {
            let frame = self.stack.top_mut()?;
            // callers have already stepped past their DO_CALL
            let ip = if innermost { frame.ip } else { frame.ip.saturating_sub(1) };
            innermost = false;
            let func = Arc::clone(&frame.func);
            for region in &func.try_regions {
                match region.zone(ip) {
                    Some(Zone::Try) => {
                        if let Some(catch) = region.catch_start {
                            frame.exception = Some(exc);
                            frame.ip = catch as usize;
                            return Ok(());
                        }
                        if let Some(fs) = region.finally_start {
                            frame.pending_finally.push((fs, Completion::Throw(exc)));
                            frame.ip = fs as usize;
                            return Ok(());
                        }
                    }
                    Some(Zone::Catch) => {
                        frame.exception = None;
                        if let Some(fs) = region.finally_start {
                            frame.pending_finally.push((fs, Completion::Throw(exc)));
                            frame.ip = fs as usize;
                            return Ok(());
                        }
                    }
                    Some(Zone::Finally) => {
                        if let Some(fs) = region.finally_start {
                            frame.pending_finally.retain(|(k, _)| *k != fs);
                        }
                    }
                    None => {}
                }
            }
            let dropped = self.stack.pop();
            if let Some(f) = dropped {
                log::trace!("unwound {} for {}", f.func.name, exc.class().name);
            }
        }
        Err(VmError::Thrown(exc))
    }

    /// Return from the current frame, running enclosing finally blocks first.
    pub(crate) fn begin_return(&mut self, v: Value) -> Result<Flow, VmError> {
        let frame = self.stack.top_mut()?;
        let ip = frame.ip;
        let func = Arc::clone(&frame.func);
        for region in &func.try_regions {
            let Some(fs) = region.finally_start else { continue };
            match region.zone(ip) {
                Some(Zone::Finally) => frame.pending_finally.retain(|(k, _)| *k != fs),
                Some(Zone::Try) | Some(Zone::Catch) => {
                    frame.pending_finally.push((fs, Completion::Return(v)));
                    return Ok(Flow::Jump(fs as usize));
                }
                None => {}
            }
        }
        Ok(Flow::Return(v))
    }

    /// Jump to `target`, passing through every finally block that lies
    /// between here and there.
    pub(crate) fn transfer_to(&mut self, target: usize) -> Result<Flow, VmError> {
        let frame = self.stack.top_mut()?;
        let ip = frame.ip;
        let func = Arc::clone(&frame.func);
        for region in &func.try_regions {
            if !region.contains(ip) || region.contains(target) {
                continue;
            }
            let Some(fs) = region.finally_start else { continue };
            match region.zone(ip) {
                Some(Zone::Finally) => frame.pending_finally.retain(|(k, _)| *k != fs),
                Some(_) => {
                    frame.pending_finally.push((fs, Completion::Jump(target as u32)));
                    return Ok(Flow::Jump(fs as usize));
                }
                None => {}
            }
        }
        Ok(Flow::Jump(target))
    }

    /// Resume whatever completion is parked on the finally block at `start`.
    pub(crate) fn finish_finally(&mut self, start: u32) -> Result<Flow, VmError> {
        let frame = self.stack.top_mut()?;
        match frame.pending_finally.last() {
            Some((k, _)) if *k == start => {}
            _ => return Ok(Flow::Next),
        }
        let Some((_, completion)) = frame.pending_finally.pop() else {
            return Ok(Flow::Next);
        };
        match completion {
            Completion::Jump(t) => self.transfer_to(t as usize),
            Completion::Return(v) => self.begin_return(v),
            Completion::Throw(e) => Err(VmError::Thrown(e)),
        }
    }

    // ---------------------------------------------------------------
    // calls

    /// Turn a pending call into a frame, or run it directly when it is
    /// native.
    pub(crate) fn start_call(&mut self, mut call: PendingCall) -> Result<Started, VmError> {
        if let Some(name) = call.magic_name.take() {
            let mut packed = PhpArray::with_capacity(call.args.len());
            for arg in call.args.drain(..) {
                packed.push(arg.into_value());
            }
            for (k, arg) in call.named.drain(..) {
                packed.insert(ArrayKey::from(k.as_str()), arg.into_value());
            }
            call.args = vec![Arg::Val(Value::str(&name)), Arg::Val(Value::Array(packed))];
        }
        match std::mem::replace(&mut call.target, CallTarget::None) {
            CallTarget::User { func, captured } => {
                let frame = self.build_frame(&func, captured, call)?;
                if func.flags.generator {
                    return Ok(Started::Done(Value::Object(generator::create(self, frame)?)));
                }
                Ok(Started::Frame(frame))
            }
            CallTarget::Native(native) => {
                let caller_args = self.stack.top().map(|f| f.args.clone()).unwrap_or_default();
                let args = flatten_args(call);
                let mut cx = CallContext::new(self, caller_args);
                Ok(Started::Done(native.call(&mut cx, args)?))
            }
            CallTarget::NativeMethod(f) => {
                let this = call.this.clone();
                let args = flatten_args(call);
                Ok(Started::Done(f(self, this.as_ref(), args)?))
            }
            CallTarget::ValueMethod { receiver, name } => {
                let args = flatten_args(call);
                Ok(Started::Done(self.value_method(&receiver, &name, args)?))
            }
            CallTarget::None => Ok(Started::Done(Value::Null)),
        }
    }

    /// Run a call to completion on top of the current stack.
    pub(crate) fn call_pending(&mut self, call: PendingCall) -> Result<Value, VmError> {
        match self.start_call(call)? {
            Started::Done(v) => Ok(v),
            Started::Frame(frame) => {
                let base = self.stack.len();
                self.stack.push(frame)?;
                match self.run_frames(base)? {
                    Exit::Returned(v) => Ok(v),
                    Exit::Suspended(..) => {
                        Err(EngineFatal::StackCorruption("a plain call suspended like a generator".into()).into())
                    }
                }
            }
        }
    }

    fn build_frame(&mut self, func: &Arc<CompiledFunction>, captured: Vec<(u32, Slot)>, call: PendingCall) -> Result<CallFrame, VmError> {
        let mut frame = CallFrame::new(Arc::clone(func));
        frame.scope = call
            .scope
            .clone()
            .or_else(|| func.scope_name.as_deref().and_then(|n| self.registry.class(n)));
        frame.static_class = call.static_class.clone().or_else(|| frame.scope.clone());
        if !func.flags.is_static {
            frame.this = call.this.clone();
        }
        if let (Some(idx), Some(this)) = (func.this_cv, &frame.this) {
            if let Some(slot) = frame.cvs.get_mut(idx as usize) {
                *slot = Slot::Val(Value::Object(this.clone()));
            }
        }
        for (idx, slot) in captured {
            if let Some(dst) = frame.cvs.get_mut(idx as usize) {
                *dst = slot;
            }
        }

        let display = func.name.clone();
        let nparams = func.params.len();
        let variadic = func.params.last().is_some_and(|p| p.variadic);
        let fixed = if variadic { nparams - 1 } else { nparams };
        frame.passed = vec![false; nparams];
        frame.args = call.args.iter().map(Arg::value).collect();

        let named_used = !call.named.is_empty();
        let mut rest = PhpArray::new();
        for (i, arg) in call.args.into_iter().enumerate() {
            if i < fixed {
                self.bind_param(&mut frame, &display, i, arg)?;
            } else if variadic {
                let v = self.check_param(&frame, &display, fixed, arg.into_value())?;
                rest.push(v);
            }
        }
        for (name, arg) in call.named {
            match func.params[..fixed].iter().position(|p| p.name == name) {
                Some(i) => {
                    if frame.passed[i] {
                        return Err(VmError::error(format!("Named parameter ${} overwrites previous argument", name)));
                    }
                    self.bind_param(&mut frame, &display, i, arg)?;
                }
                None if variadic => {
                    rest.insert(ArrayKey::from(name.as_str()), arg.into_value());
                }
                None => return Err(VmError::error(format!("Unknown named parameter ${}", name))),
            }
        }
        if variadic {
            frame.cvs[fixed] = Slot::Val(Value::Array(rest));
            frame.passed[fixed] = true;
        }

        for i in 0..fixed {
            if frame.passed[i] {
                continue;
            }
            let p = &func.params[i];
            match &p.default {
                ParamDefault::Constant(c) => frame.cvs[i] = Slot::Val(Value::from_constant(c)),
                ParamDefault::Code => {}
                ParamDefault::None => {
                    if named_used {
                        return Err(VmError::raise(
                            "ArgumentCountError",
                            format!("{}(): Argument #{} (${}) not passed", display, i + 1, p.name),
                        ));
                    }
                    let required = func.required_params();
                    let passed = frame.passed.iter().filter(|p| **p).count();
                    let bound = if variadic || required < fixed { "at least" } else { "exactly" };
                    return Err(VmError::raise(
                        "ArgumentCountError",
                        format!(
                            "Too few arguments to function {}(), {} passed and {} {} expected",
                            display, passed, bound, required
                        ),
                    ));
                }
            }
        }
        Ok(frame)
    }

    fn bind_param(&mut self, frame: &mut CallFrame, display: &str, i: usize, arg: Arg) -> Result<(), VmError> {
        let by_ref = frame.func.params[i].by_ref;
        let slot = match arg {
            Arg::Ref(cell) if by_ref => Slot::Ref(cell),
            other => Slot::Val(self.check_param(frame, display, i, other.into_value())?),
        };
        frame.cvs[i] = slot;
        frame.passed[i] = true;
        Ok(())
    }

    fn check_param(&mut self, frame: &CallFrame, display: &str, i: usize, v: Value) -> Result<Value, VmError> {
        let p = &frame.func.params[i];
        let Some(hint) = &p.type_hint else { return Ok(v) };
        let mut hint = resolve_hint(hint, frame.scope.as_ref(), frame.static_class.as_ref());
        if matches!(&p.default, ParamDefault::Constant(crate::ir::value::Constant::Null)) {
            hint.nullable = true;
        }
        match self.coerce_to_type(&hint, v)? {
            Ok(v) => Ok(v),
            Err(v) => Err(VmError::type_error(format!(
                "{}(): Argument #{} (${}) must be of type {}, {} given",
                display,
                i + 1,
                p.name,
                hint,
                v.type_name()
            ))),
        }
    }

    /// Declared return type check, applied by `RETURN`.
    pub(crate) fn check_return(&mut self, v: Value) -> Result<Value, VmError> {
        let frame = self.stack.top()?;
        let func = Arc::clone(&frame.func);
        let Some(hint) = &func.return_type else { return Ok(v) };
        if func.flags.generator {
            return Ok(v);
        }
        if hint.names.iter().any(|n| n.eq_ignore_ascii_case("void")) {
            return Ok(v);
        }
        let hint = resolve_hint(hint, frame.scope.as_ref(), frame.static_class.as_ref());
        match self.coerce_to_type(&hint, v)? {
            Ok(v) => Ok(v),
            Err(v) => Err(VmError::type_error(format!(
                "{}(): Return value must be of type {}, {} returned",
                func.name,
                hint,
                v.type_name()
            ))),
        }
    }
}

/// Replace `self` and `static` with the class they denote in this frame.
fn resolve_hint(hint: &TypeHint, scope: Option<&Arc<RuntimeClass>>, static_class: Option<&Arc<RuntimeClass>>) -> TypeHint {
    let mut out = hint.clone();
    for n in out.names.iter_mut() {
        if n.eq_ignore_ascii_case("self") {
            if let Some(s) = scope {
                *n = s.name.clone();
            }
        } else if n.eq_ignore_ascii_case("static") {
            if let Some(s) = static_class.or(scope) {
                *n = s.name.clone();
            }
        }
    }
    out
}

/// Natives take positional values; named arguments follow in order.
fn flatten_args(call: PendingCall) -> Vec<Value> {
    let mut args: Vec<Value> = call.args.into_iter().map(Arg::into_value).collect();
    args.extend(call.named.into_iter().map(|(_, a)| a.into_value()));
    args
}
