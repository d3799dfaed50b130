use std::sync::Arc;

use indexmap::IndexMap;

use crate::ir::err::{CompileError, CompileErrorKind};
use crate::ir::function::{CompiledFunction, FunctionFlags, Param, TryRegion, TypeHint};
use crate::ir::instruction::{Instruction, Operand, OperandType};
use crate::ir::op::Opcode;
use crate::ir::value::Constant;
use crate::location::Location;

/// Forward-referencable jump destination, resolved when the function is
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

#[derive(Debug, Clone, Copy)]
enum PatchSlot {
    Op1,
    Op2,
}

/// Iterator owned by an enclosing `foreach`, freed on early exits.
#[derive(Debug, Clone, Copy)]
pub struct ForeachScope {
    pub iter: u32,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub struct LoopScope {
    pub break_label: Label,
    pub continue_label: Label,
    /// Number of enclosing try-with-finally regions when the loop began.
    pub finally_depth: usize,
    pub foreach: Option<ForeachScope>,
}

/// A per-function lowering helper: slot allocation for compiled variables
/// and temporaries, the constant pool, the instruction buffer and the label
/// table used to back-patch jumps.
pub struct FunctionBuilder {
    pub name: String,
    pub scope_name: Option<String>,
    pub file: String,
    pub line: u32,
    instructions: Vec<Instruction>,
    constants: Vec<Constant>,
    cvs: IndexMap<String, u32>,
    next_tmp: u32,
    labels: Vec<Option<u32>>,
    patches: Vec<(usize, PatchSlot, Label)>,
    pub try_regions: Vec<TryRegion>,
    pub loops: Vec<LoopScope>,
    pub finally_depth: usize,
    pub closures: Vec<Arc<CompiledFunction>>,
    pub params: Vec<Param>,
    pub flags: FunctionFlags,
    pub return_type: Option<TypeHint>,
    pub current_line: u32,
    next_static: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        FunctionBuilder {
            name: name.into(),
            scope_name: None,
            file: file.into(),
            line,
            instructions: Vec::new(),
            constants: Vec::new(),
            cvs: IndexMap::new(),
            next_tmp: 0,
            labels: Vec::new(),
            patches: Vec::new(),
            try_regions: Vec::new(),
            loops: Vec::new(),
            finally_depth: 0,
            closures: Vec::new(),
            params: Vec::new(),
            flags: FunctionFlags::default(),
            return_type: None,
            current_line: line,
            next_static: 0,
        }
    }

    pub fn alloc_tmp(&mut self) -> Operand {
        let t = self.next_tmp;
        self.next_tmp = self.next_tmp.wrapping_add(1);
        Operand::tmp(t)
    }

    /// Compiled variable for `name`, created on first use.
    pub fn cv(&mut self, name: &str) -> Operand {
        if let Some(&idx) = self.cvs.get(name) {
            return Operand::cv(idx);
        }
        let idx = self.cvs.len() as u32;
        self.cvs.insert(name.to_string(), idx);
        Operand::cv(idx)
    }

    pub fn lookup_cv(&self, name: &str) -> Option<Operand> {
        self.cvs.get(name).map(|&i| Operand::cv(i))
    }

    pub fn cv_names(&self) -> impl Iterator<Item = &str> {
        self.cvs.keys().map(|s| s.as_str())
    }

    pub fn constant(&mut self, c: Constant) -> Operand {
        if let Some(pos) = self.constants.iter().position(|existing| existing.pool_eq(&c)) {
            return Operand::constant(pos as u32);
        }
        self.constants.push(c);
        Operand::constant((self.constants.len() - 1) as u32)
    }

    pub fn string_const(&mut self, s: &str) -> Operand {
        self.constant(Constant::String(s.to_string()))
    }

    pub fn int_const(&mut self, i: i64) -> Operand {
        self.constant(Constant::Int(i))
    }

    pub fn null_const(&mut self) -> Operand {
        self.constant(Constant::Null)
    }

    pub fn emit(&mut self, mut insn: Instruction) -> usize {
        insn.line = self.current_line;
        self.instructions.push(insn);
        self.instructions.len() - 1
    }

    pub fn current_len(&self) -> usize {
        self.instructions.len()
    }

    pub fn last_opcode(&self) -> Option<Opcode> {
        self.instructions.last().map(|i| i.opcode)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u32)
    }

    pub fn bind_label(&mut self, label: Label) {
        let pos = self.instructions.len() as u32;
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(pos);
        }
    }

    /// Emit an instruction whose op1 is the jump target.
    pub fn emit_jump(&mut self, opcode: Opcode, label: Label) -> usize {
        let idx = self.emit(Instruction::new(opcode));
        self.patches.push((idx, PatchSlot::Op1, label));
        idx
    }

    /// Emit an instruction whose op2 is the jump target.
    pub fn emit_branch(&mut self, insn: Instruction, label: Label) -> usize {
        let idx = self.emit(insn);
        self.patches.push((idx, PatchSlot::Op2, label));
        idx
    }

    pub fn next_static_slot(&mut self) -> u32 {
        let s = self.next_static;
        self.next_static += 1;
        s
    }

    pub fn location(&self) -> Option<Location> {
        Some(Location::at_line(self.file.clone(), self.current_line as usize))
    }

    /// Resolve every label reference and freeze the function.
    pub fn finish(mut self) -> Result<CompiledFunction, CompileError> {
        for (idx, slot, label) in std::mem::take(&mut self.patches) {
            let target = self.labels.get(label.0 as usize).copied().flatten().ok_or_else(|| {
                CompileError::new(
                    CompileErrorKind::UnresolvedLabel,
                    format!("unresolved jump label L{} in {}", label.0, self.name),
                    self.location(),
                )
            })?;
            let insn = &mut self.instructions[idx];
            match slot {
                PatchSlot::Op1 => {
                    insn.op1_type = OperandType::Unused;
                    insn.op1 = target;
                }
                PatchSlot::Op2 => {
                    insn.op2_type = OperandType::Unused;
                    insn.op2 = target;
                }
            }
        }

        if let Some(bad) = self.instructions.iter().find(|i| i.result_type == OperandType::Const) {
            return Err(CompileError::new(
                CompileErrorKind::MalformedAst,
                format!("{} writes its result into a constant operand", bad.opcode),
                self.location(),
            ));
        }

        let this_cv = self.cvs.get("this").copied();
        Ok(CompiledFunction {
            name: self.name,
            scope_name: self.scope_name,
            file: self.file,
            line: self.line,
            params: self.params,
            instructions: self.instructions,
            constants: self.constants,
            cv_names: self.cvs.into_keys().collect(),
            num_tmps: self.next_tmp,
            try_regions: self.try_regions,
            closures: self.closures,
            flags: self.flags,
            this_cv,
            return_type: self.return_type,
        })
    }
}
