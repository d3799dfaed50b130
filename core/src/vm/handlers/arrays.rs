//! file: core/src/vm/handlers/arrays.rs
//! description: array construction and dimension (`[]`) access.
//!
//! Nested writes (`$a['x']['y'] = 1`) are compiled as a chain: each
//! `FETCH_DIM_W` moves the child out of its container into a temporary, the
//! innermost `ASSIGN_DIM` stores the value, and `ASSIGN_DIM` with
//! `PUT_BACK` stores every level back into its parent, innermost first. A
//! uniquely held array is therefore mutated without copying.

use crate::ir::instruction::{flags, Instruction};
use crate::ir::op::Opcode;

use crate::vm::array::{ArrayKey, PhpArray};
use crate::vm::context::ExecutionContext;
use crate::vm::convert::{parse_numeric, to_array_key, to_bool, to_int, Number, Numeric};
use crate::vm::error::VmError;
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::object::ObjectRef;
use crate::vm::string::PhpString;
use crate::vm::value::Value;

use super::foreach::iterate_pairs;
use super::vars::binary_of;
use super::{op_data, set_result};

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::InitArray, init_array);
    table.set(Opcode::AddArrayElement, add_array_element);
    table.set(Opcode::AddArrayUnpack, add_array_unpack);
    table.set(Opcode::FetchDimR, fetch_dim_r);
    table.set(Opcode::FetchDimW, fetch_dim_w);
    table.set(Opcode::AssignDim, assign_dim);
    table.set(Opcode::AssignDimOp, assign_dim_op);
    table.set(Opcode::UnsetDim, unset_dim);
}

const NEXT_OCCUPIED: &str = "Cannot add element to the array as the next element is already occupied";

fn key_of(v: &Value) -> Result<ArrayKey, VmError> {
    to_array_key(v).map_err(|_| VmError::type_error("Illegal offset type"))
}

fn undefined_key(ctx: &mut ExecutionContext, key: &ArrayKey) {
    match key {
        ArrayKey::Int(i) => ctx.warn(&format!("Undefined array key {}", i)),
        ArrayKey::Str(s) => ctx.warn(&format!("Undefined array key \"{}\"", s.to_string_lossy())),
    }
}

fn array_access(v: &Value) -> Option<&ObjectRef> {
    v.as_object().filter(|o| o.class().is_a("ArrayAccess"))
}

fn not_an_array(o: &ObjectRef) -> VmError {
    VmError::error(format!("Cannot use object of type {} as array", o.class().name))
}

fn init_array(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let array = PhpArray::with_capacity(insn.extended_value as usize);
    set_result(ctx, insn, Value::Array(array))?;
    Ok(Flow::Next)
}

fn add_array_element(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let key = if insn.op2().is_unused() { None } else { Some(key_of(&ctx.read(insn.op2())?)?) };
    ctx.modify(insn.result(), |ctx, arr| {
        if let Value::Array(a) = arr {
            match key {
                Some(k) => a.insert(k, v),
                None => {
                    if !a.push(v) {
                        ctx.warn(NEXT_OCCUPIED);
                    }
                }
            }
        }
        Ok(())
    })?;
    Ok(Flow::Next)
}

/// `[...$xs]`: integer keys are renumbered, string keys are kept.
fn add_array_unpack(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let Some(pairs) = iterate_pairs(ctx, v)? else {
        return Err(VmError::error("Only arrays and Traversables can be unpacked"));
    };
    ctx.modify(insn.result(), |ctx, arr| {
        if let Value::Array(a) = arr {
            for (k, v) in pairs {
                match k {
                    Value::String(s) => a.insert(ArrayKey::Str(s), v),
                    _ => {
                        if !a.push(v) {
                            ctx.warn(NEXT_OCCUPIED);
                        }
                    }
                }
            }
        }
        Ok(())
    })?;
    Ok(Flow::Next)
}

fn fetch_dim_r(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let quiet = insn.has_flag(flags::QUIET);
    let container = if quiet { ctx.read_quiet(insn.op1())?.unwrap_or_default() } else { ctx.read(insn.op1())? };
    let key = ctx.read(insn.op2())?;
    let v = read_dim(ctx, &container, &key, quiet)?;
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

/// `$container[$key]` for reading. `quiet` is the `isset`/`??` form: no
/// warnings, and `ArrayAccess` is asked `offsetExists` first.
pub(crate) fn read_dim(ctx: &mut ExecutionContext, container: &Value, key: &Value, quiet: bool) -> Result<Value, VmError> {
    match container {
        Value::Array(a) => {
            let k = key_of(key)?;
            match a.get(&k) {
                Some(v) => Ok(v.clone()),
                None => {
                    if !quiet {
                        undefined_key(ctx, &k);
                    }
                    Ok(Value::Null)
                }
            }
        }
        Value::String(s) => read_string_offset(ctx, s, key, quiet),
        Value::Object(o) => {
            if array_access(container).is_none() {
                return Err(not_an_array(o));
            }
            if quiet {
                let exists = ctx.call_method_unchecked(o, "offsetExists", vec![key.clone()])?;
                if !to_bool(&exists) {
                    return Ok(Value::Null);
                }
            }
            ctx.call_method_unchecked(o, "offsetGet", vec![key.clone()])
        }
        other => {
            if !quiet {
                ctx.warn(&format!("Trying to access array offset on value of type {}", other.type_name()));
            }
            Ok(Value::Null)
        }
    }
}

/// Integer position named by a string offset, if the key can be one.
fn string_index(key: &Value) -> Option<i64> {
    match key {
        Value::Int(i) => Some(*i),
        Value::Bool(_) | Value::Float(_) | Value::Null => Some(to_int(key)),
        Value::String(s) => match parse_numeric(s.as_bytes()) {
            Numeric::Full(Number::Int(i)) => Some(i),
            _ => None,
        },
        _ => None,
    }
}

fn read_string_offset(ctx: &mut ExecutionContext, s: &PhpString, key: &Value, quiet: bool) -> Result<Value, VmError> {
    let Some(idx) = string_index(key) else {
        if quiet {
            return Ok(Value::Null);
        }
        return Err(VmError::type_error(format!("Cannot access offset of type {} on string", key.type_name())));
    };
    let len = s.len() as i64;
    let pos = if idx < 0 { len + idx } else { idx };
    if pos < 0 || pos >= len {
        if quiet {
            return Ok(Value::Null);
        }
        ctx.warn(&format!("Uninitialized string offset {}", idx));
        return Ok(Value::String(PhpString::empty()));
    }
    Ok(Value::String(PhpString::from_bytes(vec![s.as_bytes()[pos as usize]])))
}

fn fetch_dim_w(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let key = if insn.op2().is_unused() { None } else { Some(ctx.read(insn.op2())?) };
    let child = ctx.modify(insn.op1(), |ctx, c| take_child(ctx, c, key.as_ref()))?;
    set_result(ctx, insn, child)?;
    Ok(Flow::Next)
}

/// Move the element at `key` out of `c` so a deeper write can modify it.
/// Missing elements and appends start out null and are created on put-back.
fn take_child(ctx: &mut ExecutionContext, c: &mut Value, key: Option<&Value>) -> Result<Value, VmError> {
    match c {
        Value::Null | Value::Bool(false) => Ok(Value::Null),
        Value::Array(a) => match key {
            Some(k) => Ok(a.take(&key_of(k)?).unwrap_or_default()),
            None => Ok(Value::Null),
        },
        Value::Object(o) => {
            let o = o.clone();
            if !o.class().is_a("ArrayAccess") {
                return Err(not_an_array(&o));
            }
            let key = key.cloned().unwrap_or_default();
            ctx.call_method_unchecked(&o, "offsetGet", vec![key])
        }
        Value::String(_) => Err(VmError::error("Cannot use string offset as an array")),
        _ => Err(VmError::error("Cannot use a scalar value as an array")),
    }
}

fn assign_dim(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let data = op_data(ctx)?;
    let put_back = insn.has_flag(flags::PUT_BACK);
    let v = if put_back { ctx.take(data.op1())? } else { ctx.read(data.op1())? };
    if put_back && matches!(ctx.read_quiet(insn.op1())?, Some(Value::Object(_))) {
        // offsetGet handed out a copy; nothing was moved out of the object
        return Ok(Flow::NextWithData);
    }
    let key = if insn.op2().is_unused() { None } else { Some(ctx.read(insn.op2())?) };
    let skip_absent_null = put_back && insn.has_flag(flags::QUIET);
    let result = if insn.result().is_unused() { None } else { Some(v.clone()) };
    ctx.modify(insn.op1(), |ctx, c| store_dim(ctx, c, key, v, skip_absent_null))?;
    if let Some(v) = result {
        set_result(ctx, insn, v)?;
    }
    Ok(Flow::NextWithData)
}

/// `$c[$key] = $v`. With `skip_absent_null` a null value is not stored
/// under a missing key, so `unset($a['x']['y'])` never creates `'x'`.
fn store_dim(
    ctx: &mut ExecutionContext,
    c: &mut Value,
    key: Option<Value>,
    v: Value,
    skip_absent_null: bool,
) -> Result<(), VmError> {
    if matches!(c, Value::Null | Value::Bool(false)) {
        if skip_absent_null && v.is_null() {
            return Ok(());
        }
        *c = Value::Array(PhpArray::new());
    }
    match c {
        Value::Array(a) => match key {
            Some(k) => {
                let k = key_of(&k)?;
                if skip_absent_null && v.is_null() && !a.contains_key(&k) {
                    return Ok(());
                }
                a.insert(k, v);
                Ok(())
            }
            None => {
                if !a.push(v) {
                    ctx.warn(NEXT_OCCUPIED);
                }
                Ok(())
            }
        },
        Value::Object(o) => {
            let o = o.clone();
            if !o.class().is_a("ArrayAccess") {
                return Err(not_an_array(&o));
            }
            ctx.call_method_unchecked(&o, "offsetSet", vec![key.unwrap_or_default(), v])?;
            Ok(())
        }
        Value::String(s) => {
            let Some(key) = key else {
                return Err(VmError::error("[] operator not supported for strings"));
            };
            let Some(idx) = string_index(&key) else {
                return Err(VmError::type_error(format!("Cannot access offset of type {} on string", key.type_name())));
            };
            let mut bytes = s.as_bytes().to_vec();
            let pos = if idx < 0 { bytes.len() as i64 + idx } else { idx };
            if pos < 0 {
                ctx.warn(&format!("Illegal string offset {}", idx));
                return Ok(());
            }
            let value = ctx.to_string(&v)?;
            let Some(&first) = value.as_bytes().first() else {
                return Err(VmError::error("Cannot assign an empty string to a string offset"));
            };
            let pos = pos as usize;
            if pos >= bytes.len() {
                bytes.resize(pos + 1, b' ');
            }
            bytes[pos] = first;
            *c = Value::String(PhpString::from_bytes(bytes));
            Ok(())
        }
        _ => Err(VmError::error("Cannot use a scalar value as an array")),
    }
}

fn assign_dim_op(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let data = op_data(ctx)?;
    let op = binary_of(data.extended_value)?;
    let rhs = ctx.read(data.op1())?;
    let key = if insn.op2().is_unused() { None } else { Some(ctx.read(insn.op2())?) };
    let out = ctx.modify(insn.op1(), |ctx, c| {
        if c.is_null() {
            *c = Value::Array(PhpArray::new());
        }
        match c {
            Value::Array(a) => match key {
                Some(k) => {
                    let k = key_of(&k)?;
                    let current = match a.get(&k) {
                        Some(v) => v.clone(),
                        None => {
                            undefined_key(ctx, &k);
                            Value::Null
                        }
                    };
                    let new = ctx.binary(op, &current, &rhs)?;
                    a.insert(k, new.clone());
                    Ok(new)
                }
                None => {
                    let new = ctx.binary(op, &Value::Null, &rhs)?;
                    if !a.push(new.clone()) {
                        ctx.warn(NEXT_OCCUPIED);
                    }
                    Ok(new)
                }
            },
            Value::Object(o) => {
                let o = o.clone();
                if !o.class().is_a("ArrayAccess") {
                    return Err(not_an_array(&o));
                }
                let key = key.unwrap_or_default();
                let current = ctx.call_method_unchecked(&o, "offsetGet", vec![key.clone()])?;
                let new = ctx.binary(op, &current, &rhs)?;
                ctx.call_method_unchecked(&o, "offsetSet", vec![key, new.clone()])?;
                Ok(new)
            }
            Value::String(_) => Err(VmError::error("Cannot use assign-op operators with string offsets")),
            _ => Err(VmError::error("Cannot use a scalar value as an array")),
        }
    })?;
    set_result(ctx, insn, out)?;
    Ok(Flow::NextWithData)
}

fn unset_dim(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let key = ctx.read(insn.op2())?;
    ctx.modify(insn.op1(), |ctx, c| match c {
        Value::Array(a) => {
            a.remove(&key_of(&key)?);
            Ok(())
        }
        Value::Object(o) => {
            let o = o.clone();
            if !o.class().is_a("ArrayAccess") {
                return Err(not_an_array(&o));
            }
            ctx.call_method_unchecked(&o, "offsetUnset", vec![key])?;
            Ok(())
        }
        Value::String(_) => Err(VmError::error("Cannot unset string offsets")),
        _ => Ok(()),
    })?;
    Ok(Flow::Next)
}
