//! file: core/src/vm/frame.rs
//! description: call frames, variable slots and the pending-call record.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ir::function::CompiledFunction;
use crate::ir::instruction::Operand;

use super::array::{ArrayKey, PhpArray};
use super::globals::Globals;
use super::native::{NativeFunction, NativeMethodFn};
use super::object::ObjectRef;
use super::registry::RuntimeClass;
use super::value::{Value, VarRef};

/// A compiled-variable slot. `Ref` cells are shared with other slots,
/// globals, statics or closures.
#[derive(Clone, Default, Debug)]
pub enum Slot {
    #[default]
    Undef,
    Val(Value),
    Ref(VarRef),
}

impl Slot {
    pub fn get(&self) -> Option<Value> {
        match self {
            Slot::Undef => None,
            Slot::Val(v) => Some(v.clone()),
            Slot::Ref(r) => r.get(),
        }
    }

    /// Promote the slot to a shared cell and return it.
    pub fn make_ref(&mut self) -> VarRef {
        match self {
            Slot::Ref(r) => r.clone(),
            Slot::Val(v) => {
                let r = VarRef::new(std::mem::take(v));
                *self = Slot::Ref(r.clone());
                r
            }
            Slot::Undef => {
                let r = VarRef::undefined();
                *self = Slot::Ref(r.clone());
                r
            }
        }
    }
}

/// How control leaves a `finally` block once it completes.
#[derive(Debug, Clone)]
pub enum Completion {
    Jump(u32),
    Return(Value),
    Throw(ObjectRef),
}

/// How a suspended generator frame is re-entered.
#[derive(Debug, Clone)]
pub enum Resume {
    Next,
    Send(Value),
    Throw(ObjectRef),
}

/// Inner iterable of an active `yield from`.
#[derive(Debug, Clone)]
pub enum Delegate {
    Array { array: PhpArray, pos: usize },
    Generator(ObjectRef),
}

#[derive(Debug, Clone)]
pub enum ForeachIter {
    Array { array: PhpArray, pos: usize, key: Option<ArrayKey> },
    /// By-reference iteration: the element is copied into `value` and
    /// stored back into `container` before advancing.
    ArrayRef { container: Operand, value: Operand, pos: usize, key: Option<ArrayKey> },
    Props { entries: Vec<(String, Value)>, pos: usize, key: Option<String> },
    Generator { object: ObjectRef, started: bool },
    Iterator { object: ObjectRef, started: bool },
}

#[derive(Debug, Clone)]
pub enum Arg {
    Val(Value),
    Ref(VarRef),
}

impl Arg {
    pub fn value(&self) -> Value {
        match self {
            Arg::Val(v) => v.clone(),
            Arg::Ref(r) => r.value(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Arg::Val(v) => v,
            Arg::Ref(r) => r.value(),
        }
    }
}

#[derive(Clone)]
pub enum CallTarget {
    User { func: Arc<CompiledFunction>, captured: Vec<(u32, Slot)> },
    Native(Arc<dyn NativeFunction>),
    NativeMethod(NativeMethodFn),
    /// Built-in method of a non-object handle (task, wait group, closure).
    ValueMethod { receiver: Value, name: String },
    /// `new` on a class without a constructor.
    None,
}

impl std::fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallTarget::User { func, .. } => write!(f, "User({})", func.name),
            CallTarget::Native(n) => write!(f, "Native({})", n.name()),
            CallTarget::NativeMethod(_) => write!(f, "NativeMethod"),
            CallTarget::ValueMethod { name, .. } => write!(f, "ValueMethod({})", name),
            CallTarget::None => write!(f, "None"),
        }
    }
}

/// A call being assembled between `INIT_*` and `DO_CALL`.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub target: CallTarget,
    pub name: String,
    pub args: Vec<Arg>,
    pub named: Vec<(String, Arg)>,
    pub this: Option<ObjectRef>,
    pub scope: Option<Arc<RuntimeClass>>,
    pub static_class: Option<Arc<RuntimeClass>>,
    /// Set when the call is routed through `__call`/`__callStatic`.
    pub magic_name: Option<String>,
}

impl PendingCall {
    pub fn new(target: CallTarget, name: impl Into<String>) -> Self {
        PendingCall {
            target,
            name: name.into(),
            args: Vec::new(),
            named: Vec::new(),
            this: None,
            scope: None,
            static_class: None,
            magic_name: None,
        }
    }

    /// Whether positional argument `i` binds to a by-reference parameter.
    pub fn param_by_ref(&self, i: usize) -> bool {
        match &self.target {
            CallTarget::User { func, .. } if self.magic_name.is_none() => match func.params.get(i) {
                Some(p) => p.by_ref,
                None => func.params.last().is_some_and(|p| p.variadic && p.by_ref),
            },
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub func: Arc<CompiledFunction>,
    pub ip: usize,
    pub cvs: Vec<Slot>,
    pub tmps: Vec<Value>,
    pub iters: HashMap<u32, ForeachIter>,
    pub this: Option<ObjectRef>,
    pub scope: Option<Arc<RuntimeClass>>,
    pub static_class: Option<Arc<RuntimeClass>>,
    /// Every positional argument as passed, for `func_get_args`.
    pub args: Vec<Value>,
    /// Which declared parameters were supplied by the caller.
    pub passed: Vec<bool>,
    pub pending_calls: Vec<PendingCall>,
    /// Caller operand receiving the return value.
    pub return_to: Option<Operand>,
    /// Completions waiting for a `finally` block, keyed by its start.
    pub pending_finally: Vec<(u32, Completion)>,
    /// Exception being matched against `CATCH` clauses.
    pub exception: Option<ObjectRef>,
    pub is_main: bool,
    pub auto_key: i64,
    pub resumed: Option<Resume>,
    pub delegate: Option<Delegate>,
    /// Variables created by name that have no compiled slot.
    pub dynamic_vars: IndexMap<String, VarRef>,
}

impl CallFrame {
    pub fn new(func: Arc<CompiledFunction>) -> Self {
        let cvs = vec![Slot::Undef; func.cv_names.len()];
        let tmps = vec![Value::Null; func.num_tmps as usize];
        CallFrame {
            func,
            ip: 0,
            cvs,
            tmps,
            iters: HashMap::new(),
            this: None,
            scope: None,
            static_class: None,
            args: Vec::new(),
            passed: Vec::new(),
            pending_calls: Vec::new(),
            return_to: None,
            pending_finally: Vec::new(),
            exception: None,
            is_main: false,
            auto_key: 0,
            resumed: None,
            delegate: None,
            dynamic_vars: IndexMap::new(),
        }
    }

    /// Top-level frame. Every compiled variable aliases its global cell, so
    /// `global $x` in a function and the script's `$x` are one variable.
    pub fn main(func: Arc<CompiledFunction>, globals: &mut Globals) -> Self {
        let mut frame = CallFrame::new(func);
        frame.is_main = true;
        for (slot, name) in frame.cvs.iter_mut().zip(frame.func.cv_names.iter()) {
            *slot = Slot::Ref(globals.entry(name));
        }
        frame
    }

    pub fn cv_name(&self, idx: u32) -> &str {
        self.func.cv_names.get(idx as usize).map(String::as_str).unwrap_or("?")
    }

    /// Source line of the instruction at `ip`.
    pub fn line_at(&self, ip: usize) -> u32 {
        self.func.instructions.get(ip).map(|i| i.line).unwrap_or(self.func.line)
    }
}
