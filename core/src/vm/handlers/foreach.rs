//! file: core/src/vm/handlers/foreach.rs
//! description: `foreach` iteration over arrays, objects, generators and
//! user iterators.
//!
//! `FE_RESET` parks an iterator in the frame under the slot named by its
//! result operand. `FE_FETCH` advances it, `FE_KEY` reads the current key and
//! `FE_FREE` drops it.

use crate::ir::instruction::{flags, Instruction, Operand};
use crate::ir::op::Opcode;

use crate::vm::array::{ArrayKey, PhpArray};
use crate::vm::context::ExecutionContext;
use crate::vm::convert::to_bool;
use crate::vm::error::{EngineFatal, VmError};
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::frame::{ForeachIter, Resume};
use crate::vm::generator::{self, GenState};
use crate::vm::object::ObjectRef;
use crate::vm::value::Value;

use super::set_result;

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::FeReset, fe_reset);
    table.set(Opcode::FeFetch, fe_fetch);
    table.set(Opcode::FeKey, fe_key);
    table.set(Opcode::FeFree, fe_free);
}

fn fe_reset(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let container = insn.op1();
    let iter = if insn.has_flag(flags::BY_REF) {
        match ctx.read_quiet(container)? {
            Some(Value::Array(_)) => ForeachIter::ArrayRef { container, value: Operand::UNUSED, pos: 0, key: None },
            Some(other) => iterator_for(ctx, other)?,
            None => iterator_for(ctx, Value::Null)?,
        }
    } else {
        let v = ctx.read(container)?;
        iterator_for(ctx, v)?
    };
    ctx.frame_mut()?.iters.insert(insn.result().index, iter);
    Ok(Flow::Next)
}

fn iterator_for(ctx: &mut ExecutionContext, v: Value) -> Result<ForeachIter, VmError> {
    let mut obj = match v {
        Value::Array(array) => return Ok(ForeachIter::Array { array, pos: 0, key: None }),
        Value::Object(o) => o,
        other => {
            ctx.warn(&format!("foreach() argument must be of type array|object, {} given", other.type_name()));
            return Ok(ForeachIter::Array { array: PhpArray::new(), pos: 0, key: None });
        }
    };
    loop {
        if obj.generator().is_some() {
            generator::rewind(ctx, &obj)?;
            return Ok(ForeachIter::Generator { object: obj, started: false });
        }
        let class = std::sync::Arc::clone(obj.class());
        if class.is_a("Iterator") {
            ctx.call_method_unchecked(&obj, "rewind", Vec::new())?;
            return Ok(ForeachIter::Iterator { object: obj, started: false });
        }
        if class.is_a("IteratorAggregate") {
            match ctx.call_method_unchecked(&obj, "getIterator", Vec::new())? {
                Value::Object(next) if next.class().is_a("Traversable") => {
                    obj = next;
                    continue;
                }
                _ => {
                    return Err(VmError::error(format!(
                        "Objects returned by {}::getIterator() must be traversable or implement interface Iterator",
                        class.name
                    )));
                }
            }
        }
        let entries = ctx.visible_properties(&obj);
        return Ok(ForeachIter::Props { entries, pos: 0, key: None });
    }
}

fn missing_iterator(slot: u32) -> VmError {
    EngineFatal::StackCorruption(format!("no foreach iterator in slot {}", slot)).into()
}

fn fe_fetch(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let slot = insn.op1().index;
    let mut iter = ctx.frame_mut()?.iters.remove(&slot).ok_or_else(|| missing_iterator(slot))?;
    let fetched = advance(ctx, insn.result(), &mut iter);
    ctx.frame_mut()?.iters.insert(slot, iter);
    match fetched? {
        Some(v) => {
            set_result(ctx, insn, v)?;
            Ok(Flow::Next)
        }
        None => Ok(Flow::Jump(insn.op2 as usize)),
    }
}

/// Step to the next element. `target` is where a by-reference loop keeps
/// the current element.
fn advance(ctx: &mut ExecutionContext, target: Operand, iter: &mut ForeachIter) -> Result<Option<Value>, VmError> {
    match iter {
        ForeachIter::Array { array, pos, key } => match array.get_index(*pos) {
            Some((k, v)) => {
                *key = Some(k.clone());
                *pos += 1;
                Ok(Some(v.clone()))
            }
            None => Ok(None),
        },
        ForeachIter::ArrayRef { container, value, pos, key } => {
            if let Some(k) = key.take() {
                write_back(ctx, *container, *value, k)?;
            }
            *value = target;
            let live = match ctx.read_quiet(*container)? {
                Some(Value::Array(a)) => a,
                _ => return Ok(None),
            };
            match live.get_index(*pos) {
                Some((k, v)) => {
                    *key = Some(k.clone());
                    *pos += 1;
                    Ok(Some(v.clone()))
                }
                None => Ok(None),
            }
        }
        ForeachIter::Props { entries, pos, key } => match entries.get(*pos) {
            Some((name, v)) => {
                *key = Some(name.clone());
                *pos += 1;
                Ok(Some(v.clone()))
            }
            None => Ok(None),
        },
        ForeachIter::Generator { object, started } => {
            if *started {
                generator::resume(ctx, object, Some(Resume::Next))?;
            }
            *started = true;
            if generator::state(object)? == GenState::Finished {
                return Ok(None);
            }
            Ok(generator::current_pair(object)?.map(|(_, v)| v))
        }
        ForeachIter::Iterator { object, started } => {
            if *started {
                ctx.call_method_unchecked(object, "next", Vec::new())?;
            }
            *started = true;
            let valid = ctx.call_method_unchecked(object, "valid", Vec::new())?;
            if !to_bool(&valid) {
                return Ok(None);
            }
            Ok(Some(ctx.call_method_unchecked(object, "current", Vec::new())?))
        }
    }
}

/// Store the by-reference loop variable back into the element it stands for.
fn write_back(ctx: &mut ExecutionContext, container: Operand, value: Operand, key: ArrayKey) -> Result<(), VmError> {
    if value.is_unused() {
        return Ok(());
    }
    let v = ctx.read_quiet(value)?.unwrap_or_default();
    ctx.modify(container, |_, c| {
        if let Value::Array(a) = c {
            if a.contains_key(&key) {
                a.insert(key, v);
            }
        }
        Ok(())
    })
}

enum KeySource {
    Ready(Value),
    Generator(ObjectRef),
    Iterator(ObjectRef),
}

fn current_key(ctx: &mut ExecutionContext, iter: &ForeachIter) -> Result<Value, VmError> {
    let source = match iter {
        ForeachIter::Array { key, .. } | ForeachIter::ArrayRef { key, .. } => {
            KeySource::Ready(key.as_ref().map(ArrayKey::to_value).unwrap_or_default())
        }
        ForeachIter::Props { key, .. } => {
            KeySource::Ready(key.as_deref().map(|k| ArrayKey::from(k).to_value()).unwrap_or_default())
        }
        ForeachIter::Generator { object, .. } => KeySource::Generator(object.clone()),
        ForeachIter::Iterator { object, .. } => KeySource::Iterator(object.clone()),
    };
    match source {
        KeySource::Ready(v) => Ok(v),
        KeySource::Generator(g) => Ok(generator::current_pair(&g)?.map(|(k, _)| k).unwrap_or_default()),
        KeySource::Iterator(o) => ctx.call_method_unchecked(&o, "key", Vec::new()),
    }
}

fn fe_key(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let slot = insn.op1().index;
    let iter = ctx.frame_mut()?.iters.remove(&slot).ok_or_else(|| missing_iterator(slot))?;
    let key = current_key(ctx, &iter);
    ctx.frame_mut()?.iters.insert(slot, iter);
    set_result(ctx, insn, key?)?;
    Ok(Flow::Next)
}

/// Every (key, value) pair of an array or `Traversable`, in iteration
/// order. `None` for anything else.
pub(crate) fn iterate_pairs(ctx: &mut ExecutionContext, v: Value) -> Result<Option<Vec<(Value, Value)>>, VmError> {
    match &v {
        Value::Array(a) => return Ok(Some(a.iter().map(|(k, v)| (k.to_value(), v.clone())).collect())),
        Value::Object(o) if o.class().is_a("Traversable") || o.generator().is_some() => {}
        _ => return Ok(None),
    }
    let mut iter = iterator_for(ctx, v)?;
    let mut pairs = Vec::new();
    while let Some(value) = advance(ctx, Operand::UNUSED, &mut iter)? {
        let key = current_key(ctx, &iter)?;
        pairs.push((key, value));
    }
    Ok(Some(pairs))
}

fn fe_free(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let slot = insn.op1().index;
    if let Some(ForeachIter::ArrayRef { container, value, key: Some(k), .. }) = ctx.frame_mut()?.iters.remove(&slot) {
        write_back(ctx, container, value, k)?;
    }
    Ok(Flow::Next)
}
