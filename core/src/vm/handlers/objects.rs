//! file: core/src/vm/handlers/objects.rs
//! description: property access, static properties, class constants and
//! `clone`.

use std::sync::Arc;

use crate::ir::instruction::{flags, Instruction};
use crate::ir::op::Opcode;

use crate::vm::context::ExecutionContext;
use crate::vm::error::VmError;
use crate::vm::exec::{Flow, HandlerTable};
use crate::vm::registry::RuntimeClass;
use crate::vm::value::{Value, VarRef};

use super::vars::binary_of;
use super::{member_name, op_data, set_result};

pub(super) fn register(table: &mut HandlerTable) {
    table.set(Opcode::FetchObjR, fetch_obj_r);
    table.set(Opcode::FetchObjW, fetch_obj_w);
    table.set(Opcode::AssignObj, assign_obj);
    table.set(Opcode::AssignObjOp, assign_obj_op);
    table.set(Opcode::UnsetObj, unset_obj);
    table.set(Opcode::Clone, clone_object);
    table.set(Opcode::FetchStaticPropR, fetch_static_prop_r);
    table.set(Opcode::FetchStaticPropW, fetch_static_prop_w);
    table.set(Opcode::AssignStaticProp, assign_static_prop);
    table.set(Opcode::AssignStaticPropOp, assign_static_prop_op);
    table.set(Opcode::FetchClassConstant, fetch_class_constant);
    table.set(Opcode::FetchClassName, fetch_class_name);
}

fn fetch_obj_r(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let quiet = insn.has_flag(flags::QUIET);
    let target = if quiet { ctx.read_quiet(insn.op1())?.unwrap_or_default() } else { ctx.read(insn.op1())? };
    let name = member_name(ctx, insn.op2())?;
    let v = match &target {
        Value::Object(o) => {
            if quiet && !ctx.isset_property(o, &name)? {
                Value::Null
            } else {
                ctx.read_property(o, &name, quiet)?
            }
        }
        other => {
            if !quiet {
                ctx.warn(&format!("Attempt to read property \"{}\" on {}", name, other.type_name()));
            }
            Value::Null
        }
    };
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

/// Root of a write chain through a property. Arrays are moved out so the
/// chain can modify them in place; anything else is copied.
fn fetch_obj_w(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let target = ctx.read(insn.op1())?;
    let name = member_name(ctx, insn.op2())?;
    let Value::Object(o) = &target else {
        return Err(VmError::error(format!("Attempt to modify property \"{}\" on {}", name, target.type_name())));
    };
    let child = match o.get_prop(&name) {
        Some(Some(Value::Array(_))) => ctx.take_property(o, &name)?,
        _ => ctx.read_property(o, &name, true)?,
    };
    set_result(ctx, insn, child)?;
    Ok(Flow::Next)
}

fn assign_obj(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let data = op_data(ctx)?;
    let put_back = insn.has_flag(flags::PUT_BACK);
    let v = if put_back { ctx.take(data.op1())? } else { ctx.read(data.op1())? };
    if put_back && matches!(v, Value::Object(_)) {
        return Ok(Flow::NextWithData);
    }
    let target = ctx.read(insn.op1())?;
    let name = member_name(ctx, insn.op2())?;
    let Value::Object(o) = &target else {
        return Err(VmError::error(format!("Attempt to assign property \"{}\" on {}", name, target.type_name())));
    };
    if insn.result().is_unused() {
        ctx.write_property(o, &name, v)?;
    } else {
        ctx.write_property(o, &name, v.clone())?;
        set_result(ctx, insn, v)?;
    }
    Ok(Flow::NextWithData)
}

fn assign_obj_op(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let data = op_data(ctx)?;
    let op = binary_of(data.extended_value)?;
    let rhs = ctx.read(data.op1())?;
    let target = ctx.read(insn.op1())?;
    let name = member_name(ctx, insn.op2())?;
    let Value::Object(o) = &target else {
        return Err(VmError::error(format!("Attempt to assign property \"{}\" on {}", name, target.type_name())));
    };
    let current = ctx.read_property(o, &name, false)?;
    let new = ctx.binary(op, &current, &rhs)?;
    ctx.write_property(o, &name, new.clone())?;
    set_result(ctx, insn, new)?;
    Ok(Flow::NextWithData)
}

fn unset_obj(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let target = ctx.read_quiet(insn.op1())?.unwrap_or_default();
    let name = member_name(ctx, insn.op2())?;
    if let Value::Object(o) = &target {
        ctx.unset_property(o, &name)?;
    }
    Ok(Flow::Next)
}

fn clone_object(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let v = ctx.read(insn.op1())?;
    let Value::Object(o) = &v else {
        return Err(VmError::error("__clone method called on non-object"));
    };
    if o.generator().is_some() {
        return Err(VmError::error(format!("Trying to clone an uncloneable object of class {}", o.class().name)));
    }
    let copy = o.duplicate();
    if ctx.registry.find_method(copy.class(), "__clone").is_some() {
        ctx.call_method_unchecked(&copy, "__clone", Vec::new())?;
    }
    set_result(ctx, insn, Value::Object(copy))?;
    Ok(Flow::Next)
}

fn static_target(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<(Arc<RuntimeClass>, String, VarRef), VmError> {
    let class = ctx.resolve_class_operand(insn.op1(), insn.extended_value)?;
    let name = member_name(ctx, insn.op2())?;
    let cell = ctx.static_prop_ref(&class, &name)?;
    Ok((class, name, cell))
}

fn uninitialized_static(class: &RuntimeClass, name: &str) -> VmError {
    VmError::error(format!("Typed static property {}::${} must not be accessed before initialization", class.name, name))
}

fn fetch_static_prop_r(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let quiet = insn.has_flag(flags::QUIET);
    let v = match static_target(ctx, insn) {
        Ok((class, name, cell)) => match cell.get() {
            Some(v) => v,
            None if quiet => Value::Null,
            None => return Err(uninitialized_static(&class, &name)),
        },
        Err(VmError::Raise { .. }) if quiet => Value::Null,
        Err(e) => return Err(e),
    };
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

fn fetch_static_prop_w(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let (_, _, cell) = static_target(ctx, insn)?;
    let child = cell.with(|v| match v {
        Value::Array(_) => std::mem::take(v),
        other => other.clone(),
    });
    set_result(ctx, insn, child)?;
    Ok(Flow::Next)
}

/// Apply the declared type of a static property to an incoming value.
fn coerce_static(ctx: &mut ExecutionContext, class: &RuntimeClass, name: &str, v: Value) -> Result<Value, VmError> {
    let Some(hint) = class.static_props.get(name).and_then(|e| e.info.type_hint.clone()) else {
        return Ok(v);
    };
    match ctx.coerce_to_type(&hint, v)? {
        Ok(v) => Ok(v),
        Err(v) => Err(VmError::type_error(format!(
            "Cannot assign {} to property {}::${} of type {}",
            v.type_name(),
            class.name,
            name,
            hint
        ))),
    }
}

fn assign_static_prop(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let data = op_data(ctx)?;
    let put_back = insn.has_flag(flags::PUT_BACK);
    let v = if put_back { ctx.take(data.op1())? } else { ctx.read(data.op1())? };
    if put_back && matches!(v, Value::Object(_)) {
        return Ok(Flow::NextWithData);
    }
    let (class, name, cell) = static_target(ctx, insn)?;
    let v = coerce_static(ctx, &class, &name, v)?;
    if insn.result().is_unused() {
        cell.set(v);
    } else {
        cell.set(v.clone());
        set_result(ctx, insn, v)?;
    }
    Ok(Flow::NextWithData)
}

fn assign_static_prop_op(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let data = op_data(ctx)?;
    let op = binary_of(data.extended_value)?;
    let rhs = ctx.read(data.op1())?;
    let (class, name, cell) = static_target(ctx, insn)?;
    let Some(current) = cell.get() else {
        return Err(uninitialized_static(&class, &name));
    };
    let new = ctx.binary(op, &current, &rhs)?;
    let new = coerce_static(ctx, &class, &name, new)?;
    cell.set(new.clone());
    set_result(ctx, insn, new)?;
    Ok(Flow::NextWithData)
}

fn fetch_class_constant(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let class = ctx.resolve_class_operand(insn.op1(), insn.extended_value)?;
    let name = member_name(ctx, insn.op2())?;
    let v = ctx.class_constant(&class, &name)?;
    set_result(ctx, insn, v)?;
    Ok(Flow::Next)
}

fn fetch_class_name(ctx: &mut ExecutionContext, insn: &Instruction) -> Result<Flow, VmError> {
    let class = ctx.resolve_class_operand(insn.op1(), insn.extended_value)?;
    set_result(ctx, insn, Value::from(class.name.clone()))?;
    Ok(Flow::Next)
}
