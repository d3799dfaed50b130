//! file: core/src/ir/function.rs
//! description: compiled function and class descriptors.
//!
//! Everything here is immutable once the compiler hands it over. Function
//! bodies are shared through `Arc` so many tasks can execute the same code
//! without synchronization.

use std::sync::Arc;

use serde::Serialize;

use crate::ast::{ClassKind, TypeName, Visibility};

use super::instruction::Instruction;
use super::value::Constant;

/// Declared parameter type. Names keep their source spelling, minus any
/// leading namespace separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeHint {
    pub names: Vec<String>,
    pub nullable: bool,
}

impl From<&TypeName> for TypeHint {
    fn from(t: &TypeName) -> Self {
        let mut nullable = t.nullable;
        let mut names = Vec::with_capacity(t.names.len());
        for n in &t.names {
            let n = n.trim_start_matches('\\');
            if n.eq_ignore_ascii_case("null") {
                nullable = true;
            } else {
                names.push(n.to_string());
            }
        }
        TypeHint { names, nullable }
    }
}

impl std::fmt::Display for TypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.nullable && self.names.len() == 1 {
            write!(f, "?")?;
        }
        write!(f, "{}", self.names.join("|"))?;
        if self.nullable && self.names.len() > 1 {
            write!(f, "|null")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParamDefault {
    None,
    /// Bound directly when the frame is created.
    Constant(Constant),
    /// Evaluated by the function prologue behind a `JMP_SKIP_DEFAULT`.
    Code,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub type_hint: Option<TypeHint>,
    pub by_ref: bool,
    pub variadic: bool,
    pub default: ParamDefault,
}

impl Param {
    pub fn is_required(&self) -> bool {
        !self.variadic && self.default == ParamDefault::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionFlags {
    pub generator: bool,
    pub variadic: bool,
    pub is_static: bool,
    pub by_ref_return: bool,
    pub closure: bool,
}

/// Which part of a try region an instruction index falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Try,
    Catch,
    Finally,
}

/// A marked try/catch/finally region. Indices are instruction offsets;
/// `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TryRegion {
    pub try_start: u32,
    pub catch_start: Option<u32>,
    pub finally_start: Option<u32>,
    pub end: u32,
}

impl TryRegion {
    pub fn zone(&self, ip: usize) -> Option<Zone> {
        let ip = ip as u32;
        if ip < self.try_start || ip >= self.end {
            return None;
        }
        let try_end = self.catch_start.or(self.finally_start).unwrap_or(self.end);
        if ip < try_end {
            return Some(Zone::Try);
        }
        let catch_end = self.finally_start.unwrap_or(self.end);
        if self.catch_start.is_some() && ip < catch_end {
            return Some(Zone::Catch);
        }
        Some(Zone::Finally)
    }

    pub fn contains(&self, ip: usize) -> bool {
        (ip as u32) >= self.try_start && (ip as u32) < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledFunction {
    /// Display name: `foo`, `Foo::bar`, `{closure}` or `{main}`.
    pub name: String,
    pub scope_name: Option<String>,
    pub file: String,
    pub line: u32,
    pub params: Vec<Param>,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub cv_names: Vec<String>,
    pub num_tmps: u32,
    pub try_regions: Vec<TryRegion>,
    pub closures: Vec<Arc<CompiledFunction>>,
    pub flags: FunctionFlags,
    pub this_cv: Option<u32>,
    pub return_type: Option<TypeHint>,
}

impl CompiledFunction {
    pub fn cv_index(&self, name: &str) -> Option<u32> {
        self.cv_names.iter().position(|n| n == name).map(|i| i as u32)
    }

    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.is_required()).count()
    }

    /// Short name without the class prefix, as used in stack traces.
    pub fn short_name(&self) -> &str {
        match self.name.rsplit_once("::") {
            Some((_, m)) => m,
            None => &self.name,
        }
    }
}

/// Class constant or property default: literal values are stored inline,
/// anything else compiles into a thunk evaluated lazily in class scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Initializer {
    Literal(Constant),
    Thunk(Arc<CompiledFunction>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassConstant {
    pub name: String,
    pub value: Initializer,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyInfo {
    pub name: String,
    /// `None` leaves a typed property uninitialized, an untyped one null.
    pub default: Option<Initializer>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub type_hint: Option<TypeHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledMethod {
    pub name: String,
    pub func: Arc<CompiledFunction>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledClass {
    pub name: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub is_final: bool,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub traits: Vec<String>,
    pub constants: Vec<ClassConstant>,
    pub properties: Vec<PropertyInfo>,
    pub methods: Vec<CompiledMethod>,
    pub line: u32,
}

/// The output of compiling one script: its top-level code plus every
/// hoisted declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledUnit {
    pub file: String,
    pub main: Arc<CompiledFunction>,
    pub functions: Vec<Arc<CompiledFunction>>,
    pub classes: Vec<Arc<CompiledClass>>,
}
