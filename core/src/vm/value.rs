//! file: core/src/vm/value.rs
//! description: the runtime value model.
//!
//! `Value` is the tagged union every opcode handler reads and writes.
//! Scalars are stored inline, strings and arrays share their buffers
//! (arrays copy on write), objects are handles: two values holding the same
//! `ObjectRef` observe each other's mutations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ir::function::CompiledFunction;
use crate::ir::value::Constant;

use super::array::{ArrayKey, PhpArray};
use super::concurrency::{TaskHandle, WaitGroupHandle};
use super::frame::Slot;
use super::object::ObjectRef;
use super::registry::RuntimeClass;
use super::string::PhpString;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier shared by objects, closures and concurrency handles.
pub(crate) fn next_handle_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(PhpString),
    Array(PhpArray),
    Object(ObjectRef),
    Resource(Resource),
    Callable(Arc<Closure>),
    Task(TaskHandle),
    WaitGroup(WaitGroupHandle),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::String(PhpString::from(s))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PhpArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Type name as used in `TypeError` messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::String(_) => "string".into(),
            Value::Array(_) => "array".into(),
            Value::Object(o) => o.class().name.clone(),
            Value::Resource(_) => "resource".into(),
            Value::Callable(_) => "Closure".into(),
            Value::Task(_) => "Task".into(),
            Value::WaitGroup(_) => "WaitGroup".into(),
        }
    }

    pub fn from_constant(c: &Constant) -> Value {
        match c {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::String(s) => Value::str(s),
            Constant::Array(items) => {
                let mut arr = PhpArray::with_capacity(items.len());
                for (k, v) in items {
                    let v = Value::from_constant(v);
                    match k.as_ref().map(Value::from_constant) {
                        None => {
                            arr.push(v);
                        }
                        Some(Value::Int(i)) => arr.insert(ArrayKey::Int(i), v),
                        Some(Value::String(s)) => arr.insert(ArrayKey::from_bytes(s.as_bytes()), v),
                        Some(Value::Bool(b)) => arr.insert(ArrayKey::Int(b as i64), v),
                        Some(Value::Float(f)) => arr.insert(ArrayKey::Int(f as i64), v),
                        Some(_) => arr.insert(ArrayKey::Str(PhpString::empty()), v),
                    }
                }
                Value::Array(arr)
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(PhpString::from(s))
    }
}

impl From<PhpArray> for Value {
    fn from(a: PhpArray) -> Self {
        Value::Array(a)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(a) => write!(f, "{:?}", a),
            Value::Object(o) => write!(f, "object({})#{}", o.class().name, o.id()),
            Value::Resource(r) => write!(f, "resource({}) of type ({})", r.id, r.kind),
            Value::Callable(c) => write!(f, "Closure#{}", c.id),
            Value::Task(t) => write!(f, "Task#{}", t.id()),
            Value::WaitGroup(w) => write!(f, "WaitGroup#{}", w.id()),
        }
    }
}

/// Shared variable cell behind references (`&$x`, `global`, `static`, by-ref
/// captures). `None` means the variable is undefined.
#[derive(Clone, Default)]
pub struct VarRef(Arc<Mutex<Option<Value>>>);

impl VarRef {
    pub fn new(v: Value) -> Self {
        VarRef(Arc::new(Mutex::new(Some(v))))
    }

    pub fn undefined() -> Self {
        VarRef(Arc::new(Mutex::new(None)))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Value>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Option<Value> {
        self.lock().clone()
    }

    pub fn value(&self) -> Value {
        self.lock().clone().unwrap_or_default()
    }

    pub fn set(&self, v: Value) {
        *self.lock() = Some(v);
    }

    pub fn take(&self) -> Value {
        self.lock().take().unwrap_or_default()
    }

    pub fn is_defined(&self) -> bool {
        self.lock().is_some()
    }

    /// Run `f` on the contained value, defining it as null first if needed.
    pub fn with<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.lock();
        f(guard.get_or_insert(Value::Null))
    }

    pub fn ptr_eq(&self, other: &VarRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{:?}", self.get())
    }
}

#[derive(Clone)]
pub struct Closure {
    pub id: u64,
    pub func: Arc<CompiledFunction>,
    /// Bound lexical variables as (slot in the closure body, captured slot).
    pub captured: Vec<(u32, Slot)>,
    pub this: Option<ObjectRef>,
    pub scope: Option<Arc<RuntimeClass>>,
    pub static_class: Option<Arc<RuntimeClass>>,
}

impl Closure {
    pub fn new(func: Arc<CompiledFunction>) -> Self {
        Closure { id: next_handle_id(), func, captured: Vec::new(), this: None, scope: None, static_class: None }
    }
}

/// Opaque handle to a host resource.
#[derive(Clone)]
pub struct Resource(Arc<ResourceData>);

pub struct ResourceData {
    pub id: u64,
    pub kind: String,
}

impl Resource {
    pub fn new(kind: impl Into<String>) -> Self {
        Resource(Arc::new(ResourceData { id: next_handle_id(), kind: kind.into() }))
    }

    pub fn ptr_eq(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::ops::Deref for Resource {
    type Target = ResourceData;

    fn deref(&self) -> &ResourceData {
        &self.0
    }
}
