//! file: core/src/vm/operands.rs
//! description: operand resolution against the current frame.
//!
//! Constants come from the function's pool, temporaries and compiled
//! variables from the frame. `Var` operands name a variable through the
//! constant pool and resolve to a compiled slot when one exists, the global
//! table at top level, or the frame's dynamic variables.

use crate::ir::instruction::{Operand, OperandType};
use crate::ir::value::Constant;

use super::context::ExecutionContext;
use super::error::{EngineFatal, VmError};
use super::frame::Slot;
use super::value::{Value, VarRef};

/// Where a named variable lives.
enum VarPlace {
    Cv(usize),
    Cell(VarRef),
}

impl ExecutionContext {
    fn out_of_range(&self, kind: &'static str, index: u32) -> VmError {
        let function = self.stack.top().map(|f| f.func.name.clone()).unwrap_or_default();
        EngineFatal::OperandOutOfRange { kind, index, function }.into()
    }

    pub(crate) fn constant_at(&self, index: u32) -> Result<&Constant, VmError> {
        let frame = self.stack.top()?;
        match frame.func.constants.get(index as usize) {
            Some(c) => Ok(c),
            None => Err(self.out_of_range("constant", index)),
        }
    }

    /// String held by a constant operand (names of functions, properties,
    /// classes).
    pub(crate) fn const_string(&self, op: Operand) -> Result<String, VmError> {
        if op.kind != OperandType::Const {
            return Err(EngineFatal::TypeIncompatible(format!("expected a constant name operand, found {}", op)).into());
        }
        match self.constant_at(op.index)? {
            Constant::String(s) => Ok(s.clone()),
            other => Err(EngineFatal::TypeIncompatible(format!("expected a string constant, found {:?}", other)).into()),
        }
    }

    fn resolve_var(&mut self, name_index: u32, create: bool) -> Result<Option<VarPlace>, VmError> {
        let name = self.const_string(Operand::constant(name_index))?;
        self.resolve_name(&name, create)
    }

    fn resolve_name(&mut self, name: &str, create: bool) -> Result<Option<VarPlace>, VmError> {
        let frame = self.stack.top_mut()?;
        if let Some(i) = frame.func.cv_index(name) {
            return Ok(Some(VarPlace::Cv(i as usize)));
        }
        if frame.is_main {
            if create {
                return Ok(Some(VarPlace::Cell(self.globals.entry(name))));
            }
            return Ok(self.globals.lookup(name).map(VarPlace::Cell));
        }
        if create {
            let cell = frame.dynamic_vars.entry(name.to_string()).or_insert_with(VarRef::undefined).clone();
            return Ok(Some(VarPlace::Cell(cell)));
        }
        Ok(frame.dynamic_vars.get(name).cloned().map(VarPlace::Cell))
    }

    fn var_name(&self, op: Operand) -> String {
        match op.kind {
            OperandType::Cv => self.stack.top().map(|f| f.cv_name(op.index).to_string()).unwrap_or_default(),
            OperandType::Var => self.const_string(Operand::constant(op.index)).unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Read an operand; undefined variables warn and read as null.
    pub(crate) fn read(&mut self, op: Operand) -> Result<Value, VmError> {
        match self.read_quiet(op)? {
            Some(v) => Ok(v),
            None => {
                let name = self.var_name(op);
                self.warn(&format!("Undefined variable ${}", name));
                Ok(Value::Null)
            }
        }
    }

    /// Read an operand; `None` only for an undefined variable.
    pub(crate) fn read_quiet(&mut self, op: Operand) -> Result<Option<Value>, VmError> {
        match op.kind {
            OperandType::Unused => Ok(Some(Value::Null)),
            OperandType::Const => Ok(Some(Value::from_constant(self.constant_at(op.index)?))),
            OperandType::TmpVar => {
                let frame = self.stack.top()?;
                match frame.tmps.get(op.index as usize) {
                    Some(v) => Ok(Some(v.clone())),
                    None => Err(self.out_of_range("temporary", op.index)),
                }
            }
            OperandType::Cv => {
                let frame = self.stack.top()?;
                match frame.cvs.get(op.index as usize) {
                    Some(slot) => Ok(slot.get()),
                    None => Err(self.out_of_range("variable", op.index)),
                }
            }
            OperandType::Var => match self.resolve_var(op.index, false)? {
                Some(VarPlace::Cv(i)) => Ok(self.stack.top()?.cvs[i].get()),
                Some(VarPlace::Cell(cell)) => Ok(cell.get()),
                None => Ok(None),
            },
        }
    }

    pub(crate) fn is_defined(&mut self, op: Operand) -> Result<bool, VmError> {
        Ok(self.read_quiet(op)?.is_some())
    }

    pub(crate) fn write(&mut self, op: Operand, v: Value) -> Result<(), VmError> {
        match op.kind {
            OperandType::Unused => Ok(()),
            OperandType::Const => {
                let function = self.stack.top().map(|f| f.func.name.clone()).unwrap_or_default();
                Err(EngineFatal::ConstantWrite(function).into())
            }
            OperandType::TmpVar => {
                let idx = op.index as usize;
                let frame = self.stack.top_mut()?;
                match frame.tmps.get_mut(idx) {
                    Some(slot) => {
                        *slot = v;
                        Ok(())
                    }
                    None => Err(self.out_of_range("temporary", op.index)),
                }
            }
            OperandType::Cv => {
                let idx = op.index as usize;
                let frame = self.stack.top_mut()?;
                match frame.cvs.get_mut(idx) {
                    Some(slot) => {
                        store(slot, v);
                        Ok(())
                    }
                    None => Err(self.out_of_range("variable", op.index)),
                }
            }
            OperandType::Var => match self.resolve_var(op.index, true)? {
                Some(VarPlace::Cv(i)) => {
                    store(&mut self.stack.top_mut()?.cvs[i], v);
                    Ok(())
                }
                Some(VarPlace::Cell(cell)) => {
                    cell.set(v);
                    Ok(())
                }
                None => Ok(()),
            },
        }
    }

    /// Move a value out of its operand. Variables are left holding null
    /// until written back.
    pub(crate) fn take(&mut self, op: Operand) -> Result<Value, VmError> {
        match op.kind {
            OperandType::TmpVar => {
                let idx = op.index as usize;
                let frame = self.stack.top_mut()?;
                match frame.tmps.get_mut(idx) {
                    Some(slot) => Ok(std::mem::take(slot)),
                    None => Err(self.out_of_range("temporary", op.index)),
                }
            }
            OperandType::Cv => {
                let idx = op.index as usize;
                let frame = self.stack.top_mut()?;
                match frame.cvs.get_mut(idx) {
                    Some(slot) => Ok(take_slot(slot)),
                    None => Err(self.out_of_range("variable", op.index)),
                }
            }
            OperandType::Var => match self.resolve_var(op.index, false)? {
                Some(VarPlace::Cv(i)) => Ok(take_slot(&mut self.stack.top_mut()?.cvs[i])),
                Some(VarPlace::Cell(cell)) => Ok(cell.take()),
                None => Ok(Value::Null),
            },
            _ => Ok(self.read_quiet(op)?.unwrap_or_default()),
        }
    }

    /// Modify an operand in place. The value is moved out so a uniquely held
    /// array is mutated without copying, then always stored back. A variable
    /// that was undefined and is still null afterwards stays undefined.
    pub(crate) fn modify<R>(
        &mut self,
        op: Operand,
        f: impl FnOnce(&mut Self, &mut Value) -> Result<R, VmError>,
    ) -> Result<R, VmError> {
        let defined = match op.kind {
            OperandType::Cv | OperandType::Var => self.is_defined(op)?,
            _ => true,
        };
        let mut v = self.take(op)?;
        let out = f(self, &mut v);
        if defined || !v.is_null() {
            self.write(op, v)?;
        } else {
            self.undefine(op)?;
        }
        out
    }

    fn undefine(&mut self, op: Operand) -> Result<(), VmError> {
        match op.kind {
            OperandType::Cv => {
                let frame = self.stack.top_mut()?;
                if let Some(slot) = frame.cvs.get_mut(op.index as usize) {
                    match slot {
                        Slot::Ref(r) => {
                            r.take();
                        }
                        other => *other = Slot::Undef,
                    }
                }
                Ok(())
            }
            OperandType::Var => match self.resolve_var(op.index, false)? {
                Some(VarPlace::Cv(i)) => self.undefine(Operand::cv(i as u32)),
                Some(VarPlace::Cell(cell)) => {
                    cell.take();
                    Ok(())
                }
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Shared cell behind a variable operand, promoting the slot if needed.
    pub(crate) fn cv_ref(&mut self, op: Operand) -> Result<VarRef, VmError> {
        match op.kind {
            OperandType::Cv => {
                let idx = op.index as usize;
                let frame = self.stack.top_mut()?;
                match frame.cvs.get_mut(idx) {
                    Some(slot) => Ok(slot.make_ref()),
                    None => Err(self.out_of_range("variable", op.index)),
                }
            }
            OperandType::Var => match self.resolve_var(op.index, true)? {
                Some(VarPlace::Cv(i)) => Ok(self.stack.top_mut()?.cvs[i].make_ref()),
                Some(VarPlace::Cell(cell)) => Ok(cell),
                None => Ok(VarRef::undefined()),
            },
            _ => Ok(VarRef::new(self.read_quiet(op)?.unwrap_or_default())),
        }
    }

    /// Make a variable operand alias `cell`. At top level the global table
    /// follows so `$GLOBALS`-style lookups see the same cell.
    pub(crate) fn bind_ref(&mut self, op: Operand, cell: VarRef) -> Result<(), VmError> {
        let (idx, name) = match op.kind {
            OperandType::Cv => (op.index as usize, self.var_name(op)),
            OperandType::Var => {
                let name = self.var_name(op);
                match self.resolve_name(&name, true)? {
                    Some(VarPlace::Cv(i)) => (i, name),
                    Some(VarPlace::Cell(_)) | None => {
                        let frame = self.stack.top_mut()?;
                        if frame.is_main {
                            self.globals.bind(&name, cell);
                        } else {
                            frame.dynamic_vars.insert(name, cell);
                        }
                        return Ok(());
                    }
                }
            }
            _ => {
                return Err(EngineFatal::TypeIncompatible(format!("cannot bind a reference to {}", op)).into());
            }
        };
        let frame = self.stack.top_mut()?;
        let is_main = frame.is_main;
        match frame.cvs.get_mut(idx) {
            Some(slot) => *slot = Slot::Ref(cell.clone()),
            None => return Err(self.out_of_range("variable", idx as u32)),
        }
        if is_main {
            self.globals.bind(&name, cell);
        }
        Ok(())
    }

    /// `unset($x)`: break any reference and leave the variable undefined.
    pub(crate) fn unset_var(&mut self, op: Operand) -> Result<(), VmError> {
        match op.kind {
            OperandType::Cv | OperandType::Var => {}
            OperandType::TmpVar => {
                // run-time name from `unset($$name)`
                let name = match self.read(op)? {
                    Value::String(s) => s.to_string_lossy().into_owned(),
                    other => self.to_string(&other)?.to_string_lossy().into_owned(),
                };
                return self.unset_named(&name);
            }
            _ => return Ok(()),
        }
        let name = self.var_name(op);
        self.unset_named(&name)
    }

    fn unset_named(&mut self, name: &str) -> Result<(), VmError> {
        match self.resolve_name(name, false)? {
            Some(VarPlace::Cv(i)) => {
                let frame = self.stack.top_mut()?;
                if frame.is_main {
                    let fresh = VarRef::undefined();
                    frame.cvs[i] = Slot::Ref(fresh.clone());
                    self.globals.bind(name, fresh);
                } else {
                    frame.cvs[i] = Slot::Undef;
                }
            }
            Some(VarPlace::Cell(_)) => {
                let frame = self.stack.top_mut()?;
                if frame.is_main {
                    self.globals.remove(name);
                } else {
                    frame.dynamic_vars.shift_remove(name);
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Read a variable by run-time name (`$$name`).
    pub(crate) fn read_named(&mut self, name: &str, quiet: bool) -> Result<Value, VmError> {
        let v = match self.resolve_name(name, false)? {
            Some(VarPlace::Cv(i)) => self.stack.top()?.cvs[i].get(),
            Some(VarPlace::Cell(cell)) => cell.get(),
            None => None,
        };
        match v {
            Some(v) => Ok(v),
            None => {
                if !quiet {
                    self.warn(&format!("Undefined variable ${}", name));
                }
                Ok(Value::Null)
            }
        }
    }

    pub(crate) fn write_named(&mut self, name: &str, v: Value) -> Result<(), VmError> {
        match self.resolve_name(name, true)? {
            Some(VarPlace::Cv(i)) => store(&mut self.stack.top_mut()?.cvs[i], v),
            Some(VarPlace::Cell(cell)) => cell.set(v),
            None => {}
        }
        Ok(())
    }
}

fn store(slot: &mut Slot, v: Value) {
    match slot {
        Slot::Ref(r) => r.set(v),
        other => *other = Slot::Val(v),
    }
}

fn take_slot(slot: &mut Slot) -> Value {
    match slot {
        Slot::Undef => Value::Null,
        Slot::Val(v) => std::mem::take(v),
        Slot::Ref(r) => r.take(),
    }
}
