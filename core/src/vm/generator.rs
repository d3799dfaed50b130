//! file: core/src/vm/generator.rs
//! description: generator objects and their resumption protocol.
//!
//! A generator owns the suspended frame of its function. Resuming pushes the
//! frame back on the caller's stack and runs it until the next `YIELD`,
//! which pops it again and hands the yielded pair back here.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use super::context::ExecutionContext;
use super::error::VmError;
use super::exec::Exit;
use super::frame::{CallFrame, Resume};
use super::native::NativeMethodFn;
use super::object::{Internal, ObjectRef};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenState {
    Created,
    Suspended,
    Running,
    Finished,
}

#[derive(Debug)]
pub struct Generator {
    pub state: GenState,
    frame: Option<Box<CallFrame>>,
    current: Option<(Value, Value)>,
    ret: Option<Value>,
    /// Resumed at least once past the first yield.
    advanced: bool,
}

impl Generator {
    fn new(frame: CallFrame) -> Self {
        Generator { state: GenState::Created, frame: Some(Box::new(frame)), current: None, ret: None, advanced: false }
    }
}

pub(crate) fn create(ctx: &mut ExecutionContext, frame: CallFrame) -> Result<ObjectRef, VmError> {
    let class = ctx.class_by_name("Generator")?;
    let cell = Arc::new(Mutex::new(Generator::new(frame)));
    Ok(ObjectRef::with_internal(class, IndexMap::new(), Internal::Generator(cell)))
}

fn cell_of(obj: &ObjectRef) -> Result<Arc<Mutex<Generator>>, VmError> {
    obj.generator()
        .cloned()
        .ok_or_else(|| VmError::error(format!("{} is not a generator", obj.class().name)))
}

fn lock(cell: &Mutex<Generator>) -> MutexGuard<'_, Generator> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run the generator until it yields again or finishes.
pub(crate) fn resume(ctx: &mut ExecutionContext, obj: &ObjectRef, how: Option<Resume>) -> Result<(), VmError> {
    let cell = cell_of(obj)?;
    let frame = {
        let mut g = lock(&cell);
        match g.state {
            GenState::Running => return Err(VmError::error("Cannot resume an already running generator")),
            GenState::Finished => {
                return match how {
                    Some(Resume::Throw(e)) => Err(VmError::Thrown(e)),
                    _ => Ok(()),
                };
            }
            GenState::Created | GenState::Suspended => {}
        }
        let Some(mut frame) = g.frame.take() else {
            g.state = GenState::Finished;
            return Ok(());
        };
        if how.is_some() {
            g.advanced = true;
        }
        frame.resumed = how;
        g.state = GenState::Running;
        frame
    };

    let base = ctx.stack.len();
    let out = match ctx.stack.push(*frame) {
        Ok(()) => ctx.run_frames(base),
        Err(e) => Err(e),
    };
    let mut g = lock(&cell);
    match out {
        Ok(Exit::Suspended(frame, key, value)) => {
            g.frame = Some(frame);
            g.current = Some((key, value));
            g.state = GenState::Suspended;
            Ok(())
        }
        Ok(Exit::Returned(v)) => {
            g.ret = Some(v);
            g.current = None;
            g.state = GenState::Finished;
            Ok(())
        }
        Err(e) => {
            g.current = None;
            g.state = GenState::Finished;
            Err(e)
        }
    }
}

/// Run an unstarted generator to its first yield.
pub(crate) fn ensure_started(ctx: &mut ExecutionContext, obj: &ObjectRef) -> Result<(), VmError> {
    let cell = cell_of(obj)?;
    let created = lock(&cell).state == GenState::Created;
    if created {
        resume(ctx, obj, None)?;
    }
    Ok(())
}

pub(crate) fn state(obj: &ObjectRef) -> Result<GenState, VmError> {
    let cell = cell_of(obj)?;
    let state = lock(&cell).state;
    Ok(state)
}

pub(crate) fn current_pair(obj: &ObjectRef) -> Result<Option<(Value, Value)>, VmError> {
    let cell = cell_of(obj)?;
    let pair = lock(&cell).current.clone();
    Ok(pair)
}

pub(crate) fn return_value(obj: &ObjectRef) -> Result<Option<Value>, VmError> {
    let cell = cell_of(obj)?;
    let g = lock(&cell);
    Ok(if g.state == GenState::Finished { g.ret.clone() } else { None })
}

/// `foreach` entry: a generator can only be iterated from its start.
pub(crate) fn rewind(ctx: &mut ExecutionContext, obj: &ObjectRef) -> Result<(), VmError> {
    ensure_started(ctx, obj)?;
    let cell = cell_of(obj)?;
    let advanced = lock(&cell).advanced;
    if advanced {
        return Err(VmError::raise("Exception", "Cannot rewind a generator that was already run"));
    }
    Ok(())
}

fn this_generator(this: Option<&ObjectRef>) -> Result<ObjectRef, VmError> {
    this.cloned().ok_or_else(|| VmError::error("Generator method called without an instance"))
}

fn gen_current(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    ensure_started(ctx, &obj)?;
    Ok(current_pair(&obj)?.map(|(_, v)| v).unwrap_or_default())
}

fn gen_key(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    ensure_started(ctx, &obj)?;
    Ok(current_pair(&obj)?.map(|(k, _)| k).unwrap_or_default())
}

fn gen_next(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    ensure_started(ctx, &obj)?;
    resume(ctx, &obj, Some(Resume::Next))?;
    Ok(Value::Null)
}

fn gen_send(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, args: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    let v = args.into_iter().next().unwrap_or_default();
    ensure_started(ctx, &obj)?;
    resume(ctx, &obj, Some(Resume::Send(v)))?;
    Ok(current_pair(&obj)?.map(|(_, v)| v).unwrap_or_default())
}

fn gen_valid(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    ensure_started(ctx, &obj)?;
    Ok(Value::Bool(state(&obj)? != GenState::Finished))
}

fn gen_rewind(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    rewind(ctx, &obj)?;
    Ok(Value::Null)
}

fn gen_get_return(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    match return_value(&obj)? {
        Some(v) => Ok(v),
        None => Err(VmError::raise("Exception", "Cannot get return value of a generator that hasn't returned")),
    }
}

fn gen_throw(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, args: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_generator(this)?;
    let exc = match args.into_iter().next() {
        Some(Value::Object(e)) if e.class().is_a("Throwable") => e,
        Some(other) => {
            return Err(VmError::type_error(format!(
                "Generator::throw(): Argument #1 ($exception) must be of type Throwable, {} given",
                other.type_name()
            )));
        }
        None => return Err(VmError::raise("ArgumentCountError", "Generator::throw() expects exactly 1 argument, 0 given")),
    };
    ensure_started(ctx, &obj)?;
    resume(ctx, &obj, Some(Resume::Throw(exc)))?;
    Ok(current_pair(&obj)?.map(|(_, v)| v).unwrap_or_default())
}

/// Native methods of the `Generator` class.
pub(crate) fn methods() -> Vec<(&'static str, NativeMethodFn)> {
    vec![
        ("current", gen_current as NativeMethodFn),
        ("key", gen_key),
        ("next", gen_next),
        ("send", gen_send),
        ("valid", gen_valid),
        ("rewind", gen_rewind),
        ("getReturn", gen_get_return),
        ("throw", gen_throw),
    ]
}
