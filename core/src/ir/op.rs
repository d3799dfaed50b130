//! file: core/src/ir/op.rs
//! description: opcode catalog.
//!
//! Opcodes occupy numeric bands by purpose. Every opcode has a fixed shape:
//! at most two source operands and at most one result, so dispatch is uniform.
//! Jump targets are raw instruction indices carried in an `Unused`-tagged
//! operand field.

use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    Nop = 0x00,

    // arithmetic and conversion
    Add = 0x01,
    Sub = 0x02,
    Mul = 0x03,
    Div = 0x04,
    Mod = 0x05,
    Pow = 0x06,
    Concat = 0x07,
    BitAnd = 0x08,
    BitOr = 0x09,
    BitXor = 0x0A,
    Shl = 0x0B,
    Shr = 0x0C,
    BitNot = 0x0D,
    BoolNot = 0x0E,
    Neg = 0x0F,
    Plus = 0x10,
    Bool = 0x11,
    /// ext: cast kind
    Cast = 0x12,
    /// Copy op1 into the result.
    QmAssign = 0x13,
    IncValue = 0x14,
    DecValue = 0x15,

    // comparison
    IsEqual = 0x20,
    IsNotEqual = 0x21,
    IsIdentical = 0x22,
    IsNotIdentical = 0x23,
    IsSmaller = 0x24,
    IsSmallerOrEqual = 0x25,
    Spaceship = 0x26,
    BoolXor = 0x27,
    /// op1 value, op2 class ref (ext: class ref mode)
    Instanceof = 0x28,
    IssetCheck = 0x29,
    EmptyCheck = 0x2A,

    // control flow
    /// op1: target
    Jmp = 0x30,
    /// op1: condition, op2: target
    JmpZ = 0x31,
    JmpNz = 0x32,
    /// op1: value, op2: target; result = null and jump when op1 is null
    JmpNull = 0x33,
    /// op1: value, op2: target; result = op1 and jump when op1 is not null
    Coalesce = 0x34,
    /// op1: parameter index, op2: target taken when the argument was supplied
    JmpSkipDefault = 0x35,
    /// op1: target; routes through enclosing finally blocks first
    JmpFinally = 0x36,
    Return = 0x37,
    Echo = 0x38,
    Exit = 0x39,
    MatchError = 0x3A,
    /// op1: iterable, result: iterator slot (flags BY_REF for write-back)
    FeReset = 0x3B,
    /// op1: iterator, op2: exit target, result: value
    FeFetch = 0x3C,
    FeKey = 0x3D,
    FeFree = 0x3E,

    // variables
    Assign = 0x40,
    AssignRef = 0x41,
    /// ext: binary opcode
    AssignOp = 0x42,
    PreInc = 0x43,
    PreDec = 0x44,
    PostInc = 0x45,
    PostDec = 0x46,
    /// op1: variable name
    FetchVar = 0x47,
    /// op1: variable name, op2: value
    AssignDynamic = 0x48,
    Unset = 0x49,
    /// op1: target cv, op2: global name
    BindGlobal = 0x4A,
    /// op1: target cv, op2: initial value, ext: static slot id
    BindStatic = 0x4B,
    FetchConstant = 0x4C,
    /// Extra operand for the preceding instruction.
    OpData = 0x4F,

    // arrays
    InitArray = 0x50,
    /// op1: value, op2: key (unused appends), result: array under construction
    AddArrayElement = 0x51,
    AddArrayUnpack = 0x52,
    FetchDimR = 0x53,
    FetchDimW = 0x54,
    AssignDim = 0x55,
    AssignDimOp = 0x56,
    UnsetDim = 0x57,

    // objects
    FetchObjR = 0x58,
    FetchObjW = 0x59,
    AssignObj = 0x5A,
    AssignObjOp = 0x5B,
    UnsetObj = 0x5C,
    Clone = 0x5D,

    // class members
    FetchStaticPropR = 0x60,
    FetchStaticPropW = 0x61,
    AssignStaticProp = 0x62,
    AssignStaticPropOp = 0x63,
    FetchClassConstant = 0x64,
    FetchClassName = 0x65,

    // call protocol
    InitFcall = 0x70,
    InitDynamicCall = 0x71,
    InitMethodCall = 0x72,
    InitStaticCall = 0x73,
    New = 0x74,
    SendVal = 0x75,
    SendVar = 0x76,
    SendNamed = 0x77,
    SendUnpack = 0x78,
    DoCall = 0x79,

    // declarations and closures
    /// op1: index into the function's closure table
    CreateClosure = 0x80,
    /// op1: closure, op2: captured cv, ext: cv index inside the closure
    BindLexical = 0x81,
    DeclareConst = 0x82,

    // exceptions
    Throw = 0x90,
    /// op1: class name, op2: mismatch target, result: catch variable
    Catch = 0x91,
    Rethrow = 0x92,
    /// op1: try region index
    FinallyEnd = 0x93,

    // generators
    /// op1: value, op2: key, result: sent value
    Yield = 0xA0,
    YieldFrom = 0xA1,

    // concurrency
    /// Launch the pending call as a task; result: task handle.
    Spawn = 0xB0,
    Await = 0xB1,
}

impl Opcode {
    pub fn as_index(self) -> usize {
        self as u8 as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Pow => "POW",
            Opcode::Concat => "CONCAT",
            Opcode::BitAnd => "BW_AND",
            Opcode::BitOr => "BW_OR",
            Opcode::BitXor => "BW_XOR",
            Opcode::Shl => "SL",
            Opcode::Shr => "SR",
            Opcode::BitNot => "BW_NOT",
            Opcode::BoolNot => "BOOL_NOT",
            Opcode::Neg => "NEG",
            Opcode::Plus => "PLUS",
            Opcode::Bool => "BOOL",
            Opcode::Cast => "CAST",
            Opcode::QmAssign => "QM_ASSIGN",
            Opcode::IncValue => "INC_VALUE",
            Opcode::DecValue => "DEC_VALUE",
            Opcode::IsEqual => "IS_EQUAL",
            Opcode::IsNotEqual => "IS_NOT_EQUAL",
            Opcode::IsIdentical => "IS_IDENTICAL",
            Opcode::IsNotIdentical => "IS_NOT_IDENTICAL",
            Opcode::IsSmaller => "IS_SMALLER",
            Opcode::IsSmallerOrEqual => "IS_SMALLER_OR_EQUAL",
            Opcode::Spaceship => "SPACESHIP",
            Opcode::BoolXor => "BOOL_XOR",
            Opcode::Instanceof => "INSTANCEOF",
            Opcode::IssetCheck => "ISSET",
            Opcode::EmptyCheck => "EMPTY",
            Opcode::Jmp => "JMP",
            Opcode::JmpZ => "JMPZ",
            Opcode::JmpNz => "JMPNZ",
            Opcode::JmpNull => "JMP_NULL",
            Opcode::Coalesce => "COALESCE",
            Opcode::JmpSkipDefault => "JMP_SKIP_DEFAULT",
            Opcode::JmpFinally => "JMP_FINALLY",
            Opcode::Return => "RETURN",
            Opcode::Echo => "ECHO",
            Opcode::Exit => "EXIT",
            Opcode::MatchError => "MATCH_ERROR",
            Opcode::FeReset => "FE_RESET",
            Opcode::FeFetch => "FE_FETCH",
            Opcode::FeKey => "FE_KEY",
            Opcode::FeFree => "FE_FREE",
            Opcode::Assign => "ASSIGN",
            Opcode::AssignRef => "ASSIGN_REF",
            Opcode::AssignOp => "ASSIGN_OP",
            Opcode::PreInc => "PRE_INC",
            Opcode::PreDec => "PRE_DEC",
            Opcode::PostInc => "POST_INC",
            Opcode::PostDec => "POST_DEC",
            Opcode::FetchVar => "FETCH_VAR",
            Opcode::AssignDynamic => "ASSIGN_DYNAMIC",
            Opcode::Unset => "UNSET",
            Opcode::BindGlobal => "BIND_GLOBAL",
            Opcode::BindStatic => "BIND_STATIC",
            Opcode::FetchConstant => "FETCH_CONSTANT",
            Opcode::OpData => "OP_DATA",
            Opcode::InitArray => "INIT_ARRAY",
            Opcode::AddArrayElement => "ADD_ARRAY_ELEMENT",
            Opcode::AddArrayUnpack => "ADD_ARRAY_UNPACK",
            Opcode::FetchDimR => "FETCH_DIM_R",
            Opcode::FetchDimW => "FETCH_DIM_W",
            Opcode::AssignDim => "ASSIGN_DIM",
            Opcode::AssignDimOp => "ASSIGN_DIM_OP",
            Opcode::UnsetDim => "UNSET_DIM",
            Opcode::FetchObjR => "FETCH_OBJ_R",
            Opcode::FetchObjW => "FETCH_OBJ_W",
            Opcode::AssignObj => "ASSIGN_OBJ",
            Opcode::AssignObjOp => "ASSIGN_OBJ_OP",
            Opcode::UnsetObj => "UNSET_OBJ",
            Opcode::Clone => "CLONE",
            Opcode::FetchStaticPropR => "FETCH_STATIC_PROP_R",
            Opcode::FetchStaticPropW => "FETCH_STATIC_PROP_W",
            Opcode::AssignStaticProp => "ASSIGN_STATIC_PROP",
            Opcode::AssignStaticPropOp => "ASSIGN_STATIC_PROP_OP",
            Opcode::FetchClassConstant => "FETCH_CLASS_CONSTANT",
            Opcode::FetchClassName => "FETCH_CLASS_NAME",
            Opcode::InitFcall => "INIT_FCALL",
            Opcode::InitDynamicCall => "INIT_DYNAMIC_CALL",
            Opcode::InitMethodCall => "INIT_METHOD_CALL",
            Opcode::InitStaticCall => "INIT_STATIC_CALL",
            Opcode::New => "NEW",
            Opcode::SendVal => "SEND_VAL",
            Opcode::SendVar => "SEND_VAR",
            Opcode::SendNamed => "SEND_NAMED",
            Opcode::SendUnpack => "SEND_UNPACK",
            Opcode::DoCall => "DO_CALL",
            Opcode::CreateClosure => "CREATE_CLOSURE",
            Opcode::BindLexical => "BIND_LEXICAL",
            Opcode::DeclareConst => "DECLARE_CONST",
            Opcode::Throw => "THROW",
            Opcode::Catch => "CATCH",
            Opcode::Rethrow => "RETHROW",
            Opcode::FinallyEnd => "FINALLY_END",
            Opcode::Yield => "YIELD",
            Opcode::YieldFrom => "YIELD_FROM",
            Opcode::Spawn => "SPAWN",
            Opcode::Await => "AWAIT",
        }
    }

    /// Opcodes whose op1 field is a raw jump target.
    pub fn jumps_via_op1(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::JmpFinally)
    }

    /// Opcodes whose op2 field is a raw jump target.
    pub fn jumps_via_op2(self) -> bool {
        matches!(
            self,
            Opcode::JmpZ
                | Opcode::JmpNz
                | Opcode::JmpNull
                | Opcode::Coalesce
                | Opcode::JmpSkipDefault
                | Opcode::FeFetch
                | Opcode::Catch
        )
    }

    /// Opcodes followed by an `OpData` carrying their third operand.
    pub fn takes_op_data(self) -> bool {
        matches!(
            self,
            Opcode::AssignDim
                | Opcode::AssignDimOp
                | Opcode::AssignObj
                | Opcode::AssignObjOp
                | Opcode::AssignStaticProp
                | Opcode::AssignStaticPropOp
        )
    }

    pub fn from_u8(raw: u8) -> Option<Opcode> {
        ALL_OPCODES.iter().copied().find(|op| *op as u8 == raw)
    }
}

pub const ALL_OPCODES: &[Opcode] = &[
    Opcode::Nop, Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::Div, Opcode::Mod, Opcode::Pow,
    Opcode::Concat, Opcode::BitAnd, Opcode::BitOr, Opcode::BitXor, Opcode::Shl, Opcode::Shr,
    Opcode::BitNot, Opcode::BoolNot, Opcode::Neg, Opcode::Plus, Opcode::Bool, Opcode::Cast,
    Opcode::QmAssign, Opcode::IncValue, Opcode::DecValue, Opcode::IsEqual, Opcode::IsNotEqual,
    Opcode::IsIdentical, Opcode::IsNotIdentical, Opcode::IsSmaller, Opcode::IsSmallerOrEqual,
    Opcode::Spaceship, Opcode::BoolXor, Opcode::Instanceof, Opcode::IssetCheck, Opcode::EmptyCheck,
    Opcode::Jmp, Opcode::JmpZ, Opcode::JmpNz, Opcode::JmpNull, Opcode::Coalesce,
    Opcode::JmpSkipDefault, Opcode::JmpFinally, Opcode::Return, Opcode::Echo, Opcode::Exit,
    Opcode::MatchError, Opcode::FeReset, Opcode::FeFetch, Opcode::FeKey, Opcode::FeFree,
    Opcode::Assign, Opcode::AssignRef, Opcode::AssignOp, Opcode::PreInc, Opcode::PreDec,
    Opcode::PostInc, Opcode::PostDec, Opcode::FetchVar, Opcode::AssignDynamic, Opcode::Unset,
    Opcode::BindGlobal, Opcode::BindStatic, Opcode::FetchConstant, Opcode::OpData,
    Opcode::InitArray, Opcode::AddArrayElement, Opcode::AddArrayUnpack, Opcode::FetchDimR,
    Opcode::FetchDimW, Opcode::AssignDim, Opcode::AssignDimOp, Opcode::UnsetDim,
    Opcode::FetchObjR, Opcode::FetchObjW, Opcode::AssignObj, Opcode::AssignObjOp,
    Opcode::UnsetObj, Opcode::Clone, Opcode::FetchStaticPropR, Opcode::FetchStaticPropW,
    Opcode::AssignStaticProp, Opcode::AssignStaticPropOp, Opcode::FetchClassConstant,
    Opcode::FetchClassName, Opcode::InitFcall, Opcode::InitDynamicCall, Opcode::InitMethodCall,
    Opcode::InitStaticCall, Opcode::New, Opcode::SendVal, Opcode::SendVar, Opcode::SendNamed,
    Opcode::SendUnpack, Opcode::DoCall, Opcode::CreateClosure, Opcode::BindLexical,
    Opcode::DeclareConst, Opcode::Throw, Opcode::Catch, Opcode::Rethrow, Opcode::FinallyEnd,
    Opcode::Yield, Opcode::YieldFrom, Opcode::Spawn, Opcode::Await,
];

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
