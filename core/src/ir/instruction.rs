//! file: core/src/ir/instruction.rs
//! description: instruction layout and operand tags.

use serde::Serialize;

use super::op::Opcode;

/// Selects how an operand index is resolved at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperandType {
    /// No operand, or a raw integer (jump target, parameter index).
    Unused,
    /// Index into the function's constant pool.
    Const,
    /// Temporary slot.
    TmpVar,
    /// Variable looked up by the name stored in the constant pool.
    Var,
    /// Compiled variable: a named local resolved to a slot at compile time.
    Cv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Operand {
    pub kind: OperandType,
    pub index: u32,
}

impl Operand {
    pub const UNUSED: Operand = Operand { kind: OperandType::Unused, index: 0 };

    pub fn constant(index: u32) -> Self {
        Operand { kind: OperandType::Const, index }
    }
    pub fn tmp(index: u32) -> Self {
        Operand { kind: OperandType::TmpVar, index }
    }
    pub fn var(name_index: u32) -> Self {
        Operand { kind: OperandType::Var, index: name_index }
    }
    pub fn cv(index: u32) -> Self {
        Operand { kind: OperandType::Cv, index }
    }
    pub fn raw(value: u32) -> Self {
        Operand { kind: OperandType::Unused, index: value }
    }

    pub fn is_unused(&self) -> bool {
        self.kind == OperandType::Unused
    }
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, OperandType::Cv | OperandType::Var)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            OperandType::Unused => write!(f, "@{}", self.index),
            OperandType::Const => write!(f, "#{}", self.index),
            OperandType::TmpVar => write!(f, "T{}", self.index),
            OperandType::Var => write!(f, "V#{}", self.index),
            OperandType::Cv => write!(f, "CV{}", self.index),
        }
    }
}

/// Instruction flag bits.
pub mod flags {
    /// Bind by reference (send, foreach, lexical capture).
    pub const BY_REF: u8 = 1;
    /// Read without undefined-variable/key diagnostics (isset, ??).
    pub const QUIET: u8 = 2;
    /// Write-back of a container taken by a `*_W` fetch.
    pub const PUT_BACK: u8 = 4;
}

/// How a class operand is interpreted; stored in `extended_value`.
pub mod class_ref {
    pub const NAMED: u32 = 0;
    pub const SELF: u32 = 1;
    pub const PARENT: u32 = 2;
    pub const STATIC: u32 = 3;
    pub const DYNAMIC: u32 = 4;
}

/// Target type of a `CAST`; stored in `extended_value`.
pub mod cast {
    pub const INT: u32 = 0;
    pub const FLOAT: u32 = 1;
    pub const STRING: u32 = 2;
    pub const BOOL: u32 = 3;
    pub const ARRAY: u32 = 4;
    pub const OBJECT: u32 = 5;
    pub const UNSET: u32 = 6;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub op1_type: OperandType,
    pub op2_type: OperandType,
    pub result_type: OperandType,
    pub op1: u32,
    pub op2: u32,
    pub result: u32,
    pub extended_value: u32,
    pub flags: u8,
    pub line: u32,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            op1_type: OperandType::Unused,
            op2_type: OperandType::Unused,
            result_type: OperandType::Unused,
            op1: 0,
            op2: 0,
            result: 0,
            extended_value: 0,
            flags: 0,
            line: 0,
        }
    }

    pub fn with_op1(mut self, op: Operand) -> Self {
        self.op1_type = op.kind;
        self.op1 = op.index;
        self
    }
    pub fn with_op2(mut self, op: Operand) -> Self {
        self.op2_type = op.kind;
        self.op2 = op.index;
        self
    }
    pub fn with_result(mut self, op: Operand) -> Self {
        self.result_type = op.kind;
        self.result = op.index;
        self
    }
    pub fn with_ext(mut self, ext: u32) -> Self {
        self.extended_value = ext;
        self
    }
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    pub fn op1(&self) -> Operand {
        Operand { kind: self.op1_type, index: self.op1 }
    }
    pub fn op2(&self) -> Operand {
        Operand { kind: self.op2_type, index: self.op2 }
    }
    pub fn result(&self) -> Operand {
        Operand { kind: self.result_type, index: self.result }
    }
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<22}", self.opcode.name())?;
        if !self.result().is_unused() {
            write!(f, " {} <-", self.result())?;
        }
        let op1 = self.op1();
        let op2 = self.op2();
        if !op1.is_unused() || self.opcode.jumps_via_op1() {
            write!(f, " {}", op1)?;
        }
        if !op2.is_unused() || self.opcode.jumps_via_op2() {
            write!(f, ", {}", op2)?;
        }
        if self.extended_value != 0 {
            write!(f, " ext={}", self.extended_value)?;
        }
        if self.flags != 0 {
            write!(f, " flags={:#x}", self.flags)?;
        }
        Ok(())
    }
}
