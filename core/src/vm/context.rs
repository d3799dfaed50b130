//! file: core/src/vm/context.rs
//! description: per-run execution state and the object protocol.
//!
//! An `ExecutionContext` composes the independently scoped pieces of a run:
//! the shared frozen registry, the call-stack manager, the global symbol
//! table and per-context class state. Everything that needs more than one of
//! them (property access with visibility and magic methods, class
//! resolution, string conversion through `__toString`) lives here.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::{ClassKind, Visibility};
use crate::ir::function::{Initializer, TypeHint};
use crate::ir::instruction::{class_ref, Operand};
use crate::ir::op::Opcode;

use super::arith::{self, Diagnostics};
use super::array::{ArrayKey, PhpArray};
use super::config::RuntimeOptions;
use super::convert::{scalar_to_string, to_bool};
use super::error::{EngineFatal, VmError};
use super::frame::{CallFrame, CallTarget, PendingCall};
use super::globals::{ClassState, Globals};
use super::object::ObjectRef;
use super::output::OutputSink;
use super::registry::{MethodEntry, MethodImpl, Registry, RuntimeClass};
use super::stack::CallStack;
use super::string::PhpString;
use super::value::{Value, VarRef};

pub struct ExecutionContext {
    pub registry: Arc<Registry>,
    pub options: Arc<RuntimeOptions>,
    pub output: Arc<dyn OutputSink>,
    pub stack: CallStack,
    pub globals: Globals,
    pub classes: ClassState,
    pub steps: u64,
    /// (object id, property) pairs currently inside a magic accessor.
    magic_guard: HashSet<(u64, String)>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("depth", &self.stack.len())
            .field("steps", &self.steps)
            .finish()
    }
}

impl Diagnostics for ExecutionContext {
    fn warn(&mut self, message: &str) {
        ExecutionContext::warn(self, message);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Allowed,
    Denied,
    Undeclared,
}

impl ExecutionContext {
    pub fn new(registry: Arc<Registry>, options: Arc<RuntimeOptions>, output: Arc<dyn OutputSink>) -> Self {
        let stack = CallStack::new(options.max_call_depth);
        ExecutionContext {
            registry,
            options,
            output,
            stack,
            globals: Globals::default(),
            classes: ClassState::default(),
            steps: 0,
            magic_guard: HashSet::new(),
        }
    }

    /// Clear every per-run table so the context can serve an unrelated run.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.globals.clear();
        self.classes.clear();
        self.magic_guard.clear();
        self.steps = 0;
    }

    pub fn warn(&mut self, message: &str) {
        let (file, line) = self.location();
        log::warn!("{} in {} on line {}", message, file, line);
        if self.options.display_warnings {
            let text = format!("\nWarning: {} in {} on line {}\n", message, file, line);
            self.output.write(text.as_bytes());
        }
    }

    pub fn echo_bytes(&mut self, bytes: &[u8]) {
        self.output.write(bytes);
    }

    pub fn frame(&self) -> Result<&CallFrame, VmError> {
        self.stack.top()
    }

    pub fn frame_mut(&mut self) -> Result<&mut CallFrame, VmError> {
        self.stack.top_mut()
    }

    /// File and line of the instruction being executed.
    pub fn location(&self) -> (String, u32) {
        match self.stack.top() {
            Ok(f) => (f.func.file.clone(), f.line_at(f.ip)),
            Err(_) => (self.options.script_name.clone(), 0),
        }
    }

    /// Call sites below the current frame, innermost first. Each entry has
    /// `file`, `line`, `function` and for methods `class`.
    pub fn backtrace(&self) -> PhpArray {
        let mut trace = PhpArray::new();
        let n = self.stack.len();
        for i in (1..n).rev() {
            let (Some(callee), Some(caller)) = (self.stack.get(i), self.stack.get(i - 1)) else {
                continue;
            };
            let mut entry = PhpArray::new();
            entry.insert(ArrayKey::from("file"), Value::str(&caller.func.file));
            entry.insert(ArrayKey::from("line"), Value::Int(caller.line_at(caller.ip.saturating_sub(1)) as i64));
            match callee.func.name.split_once("::") {
                Some((class, method)) => {
                    entry.insert(ArrayKey::from("function"), Value::str(method));
                    entry.insert(ArrayKey::from("class"), Value::str(class));
                    let kind = if callee.this.is_some() { "->" } else { "::" };
                    entry.insert(ArrayKey::from("type"), Value::str(kind));
                }
                None => entry.insert(ArrayKey::from("function"), Value::str(&callee.func.name)),
            }
            trace.push(Value::Array(entry));
        }
        trace
    }

    pub(crate) fn current_scope(&self) -> Option<Arc<RuntimeClass>> {
        self.stack.top().ok().and_then(|f| f.scope.clone())
    }

    pub(crate) fn fatal(message: impl Into<String>) -> VmError {
        VmError::Fatal(EngineFatal::TypeIncompatible(message.into()))
    }

    // ---------------------------------------------------------------
    // conversions

    pub fn to_string(&mut self, v: &Value) -> Result<PhpString, VmError> {
        match v {
            Value::Array(_) => {
                self.warn("Array to string conversion");
                Ok(PhpString::from("Array"))
            }
            Value::Object(obj) => {
                if self.registry.find_method(obj.class(), "__tostring").is_some() {
                    let out = self.call_method_unchecked(obj, "__toString", Vec::new())?;
                    return match out {
                        Value::String(s) => Ok(s),
                        other => Err(VmError::error(format!(
                            "{}::__toString(): Return value must be of type string, {} returned",
                            obj.class().name,
                            other.type_name()
                        ))),
                    };
                }
                Err(VmError::error(format!("Object of class {} could not be converted to string", obj.class().name)))
            }
            other => match scalar_to_string(other) {
                Some(s) => Ok(s),
                None => Err(VmError::error(format!(
                    "Object of class {} could not be converted to string",
                    other.type_name()
                ))),
            },
        }
    }

    pub fn echo_value(&mut self, v: &Value) -> Result<(), VmError> {
        let s = self.to_string(v)?;
        self.output.write(s.as_bytes());
        Ok(())
    }

    /// Binary operator dispatch; `.` converts through `to_string`.
    pub fn binary(&mut self, op: Opcode, a: &Value, b: &Value) -> Result<Value, VmError> {
        if op == Opcode::Concat {
            let x = self.to_string(a)?;
            let y = self.to_string(b)?;
            return Ok(Value::String(x.concat(&y)));
        }
        arith::binary_op(op, a, b, self)
    }

    /// Weakly coerce a value to a declared type. `Err` means no coercion
    /// exists.
    pub(crate) fn coerce_to_type(&mut self, hint: &TypeHint, v: Value) -> Result<Result<Value, Value>, VmError> {
        if v.is_null() {
            let ok = hint.nullable || hint.names.iter().any(|n| n.eq_ignore_ascii_case("mixed"));
            return Ok(if ok { Ok(v) } else { Err(v) });
        }
        for name in &hint.names {
            if self.matches_type(name, &v) {
                return Ok(Ok(v));
            }
        }
        let lowered: Vec<String> = hint.names.iter().map(|n| n.to_ascii_lowercase()).collect();
        let has = |t: &str| lowered.iter().any(|n| n == t);
        if matches!(v, Value::Object(_)) {
            if has("string") {
                if let Value::Object(obj) = &v {
                    if self.registry.find_method(obj.class(), "__tostring").is_some() {
                        return Ok(Ok(Value::String(self.to_string(&v)?)));
                    }
                }
            }
            return Ok(Err(v));
        }
        let scalar = matches!(v, Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_));
        if !scalar {
            return Ok(Err(v));
        }
        if has("int") {
            match &v {
                Value::Float(f) if f.fract() == 0.0 && f.is_finite() => return Ok(Ok(Value::Int(*f as i64))),
                Value::Bool(b) => return Ok(Ok(Value::Int(*b as i64))),
                Value::String(s) => {
                    if let super::convert::Numeric::Full(n) = super::convert::parse_numeric(s.as_bytes()) {
                        match n {
                            super::convert::Number::Int(i) => return Ok(Ok(Value::Int(i))),
                            super::convert::Number::Float(f) if f.fract() == 0.0 && !has("float") => {
                                return Ok(Ok(Value::Int(f as i64)));
                            }
                            super::convert::Number::Float(f) if has("float") => return Ok(Ok(Value::Float(f))),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        if has("float") {
            match &v {
                Value::Int(i) => return Ok(Ok(Value::Float(*i as f64))),
                Value::Bool(b) => return Ok(Ok(Value::Float(*b as i64 as f64))),
                Value::String(s) => {
                    if let super::convert::Numeric::Full(n) = super::convert::parse_numeric(s.as_bytes()) {
                        return Ok(Ok(Value::Float(n.to_f64())));
                    }
                }
                _ => {}
            }
        }
        if has("string") && !matches!(v, Value::String(_)) {
            return Ok(Ok(Value::String(self.to_string(&v)?)));
        }
        if has("bool") {
            return Ok(Ok(Value::Bool(to_bool(&v))));
        }
        Ok(Err(v))
    }

    fn matches_type(&self, name: &str, v: &Value) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "mixed" => true,
            "int" => matches!(v, Value::Int(_)),
            "float" => matches!(v, Value::Float(_)),
            "string" => matches!(v, Value::String(_)),
            "bool" => matches!(v, Value::Bool(_)),
            "false" => matches!(v, Value::Bool(false)),
            "true" => matches!(v, Value::Bool(true)),
            "array" => matches!(v, Value::Array(_)),
            "object" => matches!(v, Value::Object(_) | Value::Callable(_) | Value::Task(_) | Value::WaitGroup(_)),
            "iterable" => match v {
                Value::Array(_) => true,
                Value::Object(o) => o.class().is_a("Traversable"),
                _ => false,
            },
            "callable" => self.is_callable(v),
            "void" | "never" => false,
            "self" | "static" => match (v, self.current_scope()) {
                (Value::Object(o), Some(scope)) => o.class().is_subclass_of(&scope),
                _ => false,
            },
            "closure" => matches!(v, Value::Callable(_)),
            "task" => matches!(v, Value::Task(_)),
            "waitgroup" => matches!(v, Value::WaitGroup(_)),
            _ => match v {
                Value::Object(o) => o.class().is_a(name),
                _ => false,
            },
        }
    }

    pub fn is_callable(&self, v: &Value) -> bool {
        match v {
            Value::Callable(_) => true,
            Value::String(s) => {
                let name = s.to_string_lossy();
                match name.split_once("::") {
                    Some((class, method)) => self
                        .registry
                        .class(class)
                        .is_some_and(|c| self.registry.find_method(&c, method).is_some()),
                    None => self.registry.function(&name).is_some(),
                }
            }
            Value::Array(a) if a.len() == 2 => {
                let (Some(target), Some(Value::String(method))) = (a.get(&ArrayKey::Int(0)), a.get(&ArrayKey::Int(1))) else {
                    return false;
                };
                let method = method.to_string_lossy();
                match target {
                    Value::Object(o) => self.registry.find_method(o.class(), &method).is_some(),
                    Value::String(c) => self
                        .registry
                        .class(&c.to_string_lossy())
                        .is_some_and(|c| self.registry.find_method(&c, &method).is_some()),
                    _ => false,
                }
            }
            Value::Object(o) => self.registry.find_method(o.class(), "__invoke").is_some(),
            _ => false,
        }
    }

    // ---------------------------------------------------------------
    // classes

    pub fn class_by_name(&self, name: &str) -> Result<Arc<RuntimeClass>, VmError> {
        self.registry
            .class(name)
            .ok_or_else(|| VmError::error(format!("Class \"{}\" not found", name.trim_start_matches('\\'))))
    }

    /// Resolve the class operand of a `NEW`, static access or `instanceof`.
    pub(crate) fn resolve_class_operand(&mut self, op: Operand, mode: u32) -> Result<Arc<RuntimeClass>, VmError> {
        match mode {
            class_ref::SELF => self
                .current_scope()
                .ok_or_else(|| VmError::error("Cannot use \"self\" when no class scope is active")),
            class_ref::PARENT => {
                let scope = self
                    .current_scope()
                    .ok_or_else(|| VmError::error("Cannot use \"parent\" when no class scope is active"))?;
                scope
                    .parent
                    .clone()
                    .ok_or_else(|| VmError::error("Cannot use \"parent\" when current class scope has no parent"))
            }
            class_ref::STATIC => {
                let frame = self.frame()?;
                frame
                    .static_class
                    .clone()
                    .or_else(|| frame.scope.clone())
                    .ok_or_else(|| VmError::error("Cannot use \"static\" when no class scope is active"))
            }
            class_ref::DYNAMIC => {
                let v = self.read(op)?;
                match v {
                    Value::Object(o) => Ok(Arc::clone(o.class())),
                    Value::String(s) => self.class_by_name(&s.to_string_lossy()),
                    other => Err(VmError::error(format!("Cannot use value of type {} as class name", other.type_name()))),
                }
            }
            _ => {
                let name = self.const_string(op)?;
                self.class_by_name(&name)
            }
        }
    }

    pub(crate) fn scope_class_of(&self, method: &MethodEntry) -> Option<Arc<RuntimeClass>> {
        self.registry.class(&method.declaring)
    }

    fn visible(&self, visibility: Visibility, declaring: &str) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Private => self.current_scope().is_some_and(|s| s.name == declaring),
            Visibility::Protected => match self.current_scope() {
                Some(scope) => {
                    scope.is_a(declaring) || self.registry.class(declaring).is_some_and(|d| d.is_subclass_of(&scope))
                }
                None => false,
            },
        }
    }

    fn scope_label(&self) -> String {
        match self.current_scope() {
            Some(s) => format!("scope {}", s.name),
            None => "global scope".to_string(),
        }
    }

    pub(crate) fn check_method_visibility(&self, m: &MethodEntry, class: &RuntimeClass) -> Result<(), VmError> {
        if self.visible(m.visibility, &m.declaring) {
            return Ok(());
        }
        Err(VmError::error(format!(
            "Call to {} method {}::{}() from {}",
            visibility_name(m.visibility),
            class.name,
            m.name,
            self.scope_label()
        )))
    }

    /// Create an instance with evaluated property defaults. Throwables also
    /// record where they were created.
    pub fn instantiate(&mut self, class: &Arc<RuntimeClass>) -> Result<ObjectRef, VmError> {
        match class.kind {
            ClassKind::Interface => return Err(VmError::error(format!("Cannot instantiate interface {}", class.name))),
            ClassKind::Trait => return Err(VmError::error(format!("Cannot instantiate trait {}", class.name))),
            ClassKind::Class if class.is_abstract => {
                return Err(VmError::error(format!("Cannot instantiate abstract class {}", class.name)));
            }
            ClassKind::Class => {}
        }
        let props = self.property_defaults(class)?;
        let obj = ObjectRef::new(Arc::clone(class), props);
        if class.is_a("Throwable") {
            let (file, line) = self.location();
            obj.set_prop("file", Value::from(file));
            obj.set_prop("line", Value::Int(line as i64));
            let trace = self.backtrace();
            obj.set_prop("trace", Value::Array(trace));
        }
        Ok(obj)
    }

    fn property_defaults(&mut self, class: &Arc<RuntimeClass>) -> Result<IndexMap<String, Option<Value>>, VmError> {
        if let Some(cached) = self.classes.prop_defaults.get(&class.name) {
            return Ok(cached.clone());
        }
        let mut props = IndexMap::with_capacity(class.properties.len());
        for (name, entry) in &class.properties {
            let value = match &entry.info.default {
                Some(init) => {
                    let declaring = self.class_by_name(&entry.declaring)?;
                    Some(self.eval_initializer(init, &declaring)?)
                }
                None => None,
            };
            props.insert(name.clone(), value);
        }
        self.classes.prop_defaults.insert(class.name.clone(), props.clone());
        Ok(props)
    }

    /// Evaluate a constant or default initializer in the scope of its class.
    pub(crate) fn eval_initializer(&mut self, init: &Initializer, class: &Arc<RuntimeClass>) -> Result<Value, VmError> {
        match init {
            Initializer::Literal(c) => Ok(Value::from_constant(c)),
            Initializer::Thunk(func) => {
                let mut call = PendingCall::new(
                    CallTarget::User { func: Arc::clone(func), captured: Vec::new() },
                    func.name.clone(),
                );
                call.scope = Some(Arc::clone(class));
                call.static_class = Some(Arc::clone(class));
                self.call_pending(call)
            }
        }
    }

    pub fn create_exception(&mut self, class: &str, message: &str) -> Result<ObjectRef, VmError> {
        let class = match self.registry.class(class) {
            Some(c) => c,
            None => self.class_by_name("Error")?,
        };
        let obj = self.instantiate(&class)?;
        obj.set_prop("message", Value::str(message));
        Ok(obj)
    }

    pub fn class_constant(&mut self, class: &Arc<RuntimeClass>, name: &str) -> Result<Value, VmError> {
        if name.eq_ignore_ascii_case("class") {
            return Ok(Value::str(&class.name));
        }
        let Some(entry) = class.constants.get(name) else {
            return Err(VmError::error(format!("Undefined constant {}::{}", class.name, name)));
        };
        if !self.visible(entry.visibility, &entry.declaring) {
            return Err(VmError::error(format!(
                "Cannot access {} constant {}::{}",
                visibility_name(entry.visibility),
                class.name,
                name
            )));
        }
        let key = (entry.declaring.clone(), name.to_string());
        if let Some(v) = self.classes.class_constants.get(&key) {
            return Ok(v.clone());
        }
        let declaring = self.class_by_name(&entry.declaring)?;
        let init = entry.value.clone();
        let v = self.eval_initializer(&init, &declaring)?;
        self.classes.class_constants.insert(key, v.clone());
        Ok(v)
    }

    /// Cell of a static property, initialized from its default on first use.
    pub fn static_prop_ref(&mut self, class: &Arc<RuntimeClass>, name: &str) -> Result<VarRef, VmError> {
        let Some(entry) = class.static_props.get(name) else {
            return Err(VmError::error(format!("Access to undeclared static property {}::${}", class.name, name)));
        };
        if !self.visible(entry.info.visibility, &entry.declaring) {
            return Err(VmError::error(format!(
                "Cannot access {} property {}::${}",
                visibility_name(entry.info.visibility),
                class.name,
                name
            )));
        }
        let key = (entry.declaring.clone(), name.to_string());
        if let Some(cell) = self.classes.static_props.get(&key) {
            return Ok(cell.clone());
        }
        let cell = match &entry.info.default {
            Some(init) => {
                let init = init.clone();
                let declaring = self.class_by_name(&entry.declaring)?;
                VarRef::new(self.eval_initializer(&init, &declaring)?)
            }
            None => VarRef::undefined(),
        };
        self.classes.static_props.insert(key, cell.clone());
        Ok(cell)
    }

    // ---------------------------------------------------------------
    // properties

    fn property_access(&self, class: &RuntimeClass, name: &str) -> Access {
        match class.properties.get(name) {
            Some(entry) if self.visible(entry.info.visibility, &entry.declaring) => Access::Allowed,
            Some(_) => Access::Denied,
            None => Access::Undeclared,
        }
    }

    fn denied(&self, class: &RuntimeClass, name: &str) -> VmError {
        let vis = class.properties.get(name).map(|e| e.info.visibility).unwrap_or(Visibility::Private);
        VmError::error(format!("Cannot access {} property {}::${}", visibility_name(vis), class.name, name))
    }

    fn magic(&mut self, obj: &ObjectRef, method: &str, name: &str) -> Option<(u64, String)> {
        let lname = method.to_ascii_lowercase();
        self.registry.find_method(obj.class(), &lname)?;
        let key = (obj.id(), format!("{}:{}", lname, name));
        if self.magic_guard.contains(&key) {
            return None;
        }
        self.magic_guard.insert(key.clone());
        Some(key)
    }

    fn call_magic(&mut self, key: (u64, String), obj: &ObjectRef, method: &str, args: Vec<Value>) -> Result<Value, VmError> {
        let out = self.call_method_unchecked(obj, method, args);
        self.magic_guard.remove(&key);
        out
    }

    pub fn read_property(&mut self, obj: &ObjectRef, name: &str, quiet: bool) -> Result<Value, VmError> {
        let class = Arc::clone(obj.class());
        let access = self.property_access(&class, name);
        if access != Access::Denied {
            match obj.get_prop(name) {
                Some(Some(v)) => return Ok(v),
                Some(None) => {
                    if let Some(key) = self.magic(obj, "__get", name) {
                        return self.call_magic(key, obj, "__get", vec![Value::str(name)]);
                    }
                    if quiet {
                        return Ok(Value::Null);
                    }
                    return Err(VmError::error(format!(
                        "Typed property {}::${} must not be accessed before initialization",
                        class.properties.get(name).map(|e| e.declaring.as_str()).unwrap_or(&class.name),
                        name
                    )));
                }
                None => {}
            }
        }
        if let Some(key) = self.magic(obj, "__get", name) {
            return self.call_magic(key, obj, "__get", vec![Value::str(name)]);
        }
        if access == Access::Denied {
            return Err(self.denied(&class, name));
        }
        if !quiet {
            self.warn(&format!("Undefined property: {}::${}", class.name, name));
        }
        Ok(Value::Null)
    }

    pub fn write_property(&mut self, obj: &ObjectRef, name: &str, value: Value) -> Result<(), VmError> {
        let class = Arc::clone(obj.class());
        let access = self.property_access(&class, name);
        if access == Access::Allowed || (access == Access::Undeclared && obj.has_prop(name)) {
            let value = match class.properties.get(name).and_then(|e| e.info.type_hint.clone()) {
                Some(hint) => match self.coerce_to_type(&hint, value)? {
                    Ok(v) => v,
                    Err(v) => {
                        return Err(VmError::type_error(format!(
                            "Cannot assign {} to property {}::${} of type {}",
                            v.type_name(),
                            class.name,
                            name,
                            hint
                        )));
                    }
                },
                None => value,
            };
            obj.set_prop(name, value);
            return Ok(());
        }
        if let Some(key) = self.magic(obj, "__set", name) {
            self.call_magic(key, obj, "__set", vec![Value::str(name), value])?;
            return Ok(());
        }
        if access == Access::Denied {
            return Err(self.denied(&class, name));
        }
        obj.set_prop(name, value);
        Ok(())
    }

    /// Move a property out for in-place modification (`$o->a[] = 1`).
    pub(crate) fn take_property(&mut self, obj: &ObjectRef, name: &str) -> Result<Value, VmError> {
        let class = Arc::clone(obj.class());
        match self.property_access(&class, name) {
            Access::Denied if self.registry.find_method(&class, "__get").is_none() => Err(self.denied(&class, name)),
            Access::Allowed | Access::Undeclared if obj.has_prop(name) => Ok(obj.take_prop(name).unwrap_or_default()),
            _ => self.read_property(obj, name, true),
        }
    }

    pub fn isset_property(&mut self, obj: &ObjectRef, name: &str) -> Result<bool, VmError> {
        let class = Arc::clone(obj.class());
        if self.property_access(&class, name) != Access::Denied {
            if let Some(v) = obj.get_prop(name) {
                return Ok(v.is_some_and(|v| !v.is_null()));
            }
        }
        if let Some(key) = self.magic(obj, "__isset", name) {
            let out = self.call_magic(key, obj, "__isset", vec![Value::str(name)])?;
            return Ok(to_bool(&out));
        }
        Ok(false)
    }

    pub fn unset_property(&mut self, obj: &ObjectRef, name: &str) -> Result<(), VmError> {
        let class = Arc::clone(obj.class());
        match self.property_access(&class, name) {
            Access::Denied => {
                if let Some(key) = self.magic(obj, "__unset", name) {
                    self.call_magic(key, obj, "__unset", vec![Value::str(name)])?;
                    return Ok(());
                }
                Err(self.denied(&class, name))
            }
            _ => {
                if !obj.remove_prop(name) {
                    if let Some(key) = self.magic(obj, "__unset", name) {
                        self.call_magic(key, obj, "__unset", vec![Value::str(name)])?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Properties visible from the current scope, for iteration and casts.
    pub fn visible_properties(&self, obj: &ObjectRef) -> Vec<(String, Value)> {
        let class = obj.class();
        obj.props()
            .into_iter()
            .filter(|(name, _)| self.property_access(class, name) != Access::Denied)
            .filter_map(|(name, v)| v.map(|v| (name, v)))
            .collect()
    }

    // ---------------------------------------------------------------
    // calls

    /// Pending call for a user or native function.
    pub(crate) fn function_call(&self, name: &str) -> Result<PendingCall, VmError> {
        let name = name.trim_start_matches('\\');
        match self.registry.function(name) {
            Some(super::registry::FunctionEntry::User(func)) => Ok(PendingCall::new(
                CallTarget::User { func: Arc::clone(func), captured: Vec::new() },
                func.name.clone(),
            )),
            Some(super::registry::FunctionEntry::Native(n)) => Ok(PendingCall::new(CallTarget::Native(Arc::clone(n)), name)),
            None => Err(VmError::error(format!("Call to undefined function {}()", name))),
        }
    }

    fn method_target(entry: &MethodEntry) -> CallTarget {
        match &entry.imp {
            MethodImpl::User(func) => CallTarget::User { func: Arc::clone(func), captured: Vec::new() },
            MethodImpl::Native(f) => CallTarget::NativeMethod(*f),
        }
    }

    /// Pending call of `$obj->name(...)`, falling back to `__call`.
    pub(crate) fn method_call(&mut self, obj: &ObjectRef, name: &str, check: bool) -> Result<PendingCall, VmError> {
        let class = Arc::clone(obj.class());
        match self.registry.find_method(&class, name) {
            Some(m) if !check || self.visible(m.visibility, &m.declaring) => {
                if m.is_abstract {
                    return Err(VmError::error(format!("Cannot call abstract method {}::{}()", m.declaring, m.name)));
                }
                let mut call = PendingCall::new(Self::method_target(&m), format!("{}::{}", m.declaring, m.name));
                if !m.is_static {
                    call.this = Some(obj.clone());
                }
                call.scope = self.scope_class_of(&m);
                call.static_class = Some(class);
                Ok(call)
            }
            found => {
                if let Some(magic) = self.registry.find_method(&class, "__call") {
                    let mut call = PendingCall::new(Self::method_target(&magic), format!("{}::__call", magic.declaring));
                    call.this = Some(obj.clone());
                    call.scope = self.scope_class_of(&magic);
                    call.static_class = Some(class);
                    call.magic_name = Some(name.to_string());
                    return Ok(call);
                }
                match found {
                    Some(m) => {
                        self.check_method_visibility(&m, &class)?;
                        Err(VmError::error(format!("Call to undefined method {}::{}()", class.name, name)))
                    }
                    None => Err(VmError::error(format!("Call to undefined method {}::{}()", class.name, name))),
                }
            }
        }
    }

    /// Pending call of `Class::name(...)`. `forward` keeps the caller's
    /// late static binding (`self::`, `parent::`, `static::`).
    pub(crate) fn static_method_call(&mut self, class: &Arc<RuntimeClass>, name: &str, forward: bool) -> Result<PendingCall, VmError> {
        let (this, caller_static) = match self.stack.top() {
            Ok(f) => (f.this.clone(), f.static_class.clone()),
            Err(_) => (None, None),
        };
        let this = this.filter(|t| t.class().is_subclass_of(class));
        let Some(m) = self.registry.find_method(class, name) else {
            if let Some(this) = &this {
                if let Some(magic) = self.registry.find_method(class, "__call") {
                    let mut call = PendingCall::new(Self::method_target(&magic), format!("{}::__call", magic.declaring));
                    call.this = Some(this.clone());
                    call.scope = self.scope_class_of(&magic);
                    call.static_class = Some(Arc::clone(this.class()));
                    call.magic_name = Some(name.to_string());
                    return Ok(call);
                }
            }
            if let Some(magic) = self.registry.find_method(class, "__callstatic") {
                let mut call = PendingCall::new(Self::method_target(&magic), format!("{}::__callStatic", magic.declaring));
                call.scope = self.scope_class_of(&magic);
                call.static_class = Some(Arc::clone(class));
                call.magic_name = Some(name.to_string());
                return Ok(call);
            }
            return Err(VmError::error(format!("Call to undefined method {}::{}()", class.name, name)));
        };
        self.check_method_visibility(&m, class)?;
        if m.is_abstract {
            return Err(VmError::error(format!("Cannot call abstract method {}::{}()", m.declaring, m.name)));
        }
        let mut call = PendingCall::new(Self::method_target(&m), format!("{}::{}", m.declaring, m.name));
        call.scope = self.scope_class_of(&m);
        if m.is_static {
            call.static_class = match (forward, caller_static) {
                (true, Some(s)) if s.is_subclass_of(class) => Some(s),
                _ => Some(Arc::clone(class)),
            };
        } else {
            let Some(this) = this else {
                return Err(VmError::error(format!(
                    "Non-static method {}::{}() cannot be called statically",
                    m.declaring, m.name
                )));
            };
            call.static_class = Some(Arc::clone(this.class()));
            call.this = Some(this);
        }
        Ok(call)
    }

    /// Turn any callable value into a pending call.
    pub fn callable_to_call(&mut self, callee: &Value) -> Result<PendingCall, VmError> {
        match callee {
            Value::Callable(c) => {
                let mut call = PendingCall::new(
                    CallTarget::User { func: Arc::clone(&c.func), captured: c.captured.clone() },
                    c.func.name.clone(),
                );
                call.this = c.this.clone();
                call.scope = c.scope.clone();
                call.static_class = c.static_class.clone().or_else(|| c.scope.clone());
                Ok(call)
            }
            Value::String(s) => {
                let name = s.to_string_lossy().into_owned();
                match name.split_once("::") {
                    Some((class, method)) => {
                        let class = self.class_by_name(class)?;
                        self.static_method_call(&class, method, false)
                    }
                    None => self.function_call(&name),
                }
            }
            Value::Array(a) if a.len() == 2 => {
                let target = a.get(&ArrayKey::Int(0)).cloned().unwrap_or_default();
                let method = match a.get(&ArrayKey::Int(1)) {
                    Some(Value::String(m)) => m.to_string_lossy().into_owned(),
                    _ => return Err(VmError::error("Array callback must have exactly two elements")),
                };
                match target {
                    Value::Object(obj) => self.method_call(&obj, &method, true),
                    Value::String(class) => {
                        let class = self.class_by_name(&class.to_string_lossy())?;
                        self.static_method_call(&class, &method, false)
                    }
                    _ => Err(VmError::error("Array callback must have exactly two elements")),
                }
            }
            Value::Array(_) => Err(VmError::error("Array callback must have exactly two elements")),
            Value::Object(obj) => {
                if self.registry.find_method(obj.class(), "__invoke").is_some() {
                    self.method_call(obj, "__invoke", false)
                } else {
                    Err(VmError::error(format!("Object of type {} is not callable", obj.class().name)))
                }
            }
            other => Err(VmError::error(format!("Value of type {} is not callable", other.type_name()))),
        }
    }

    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, VmError> {
        let mut call = self.callable_to_call(callee)?;
        call.args = args.into_iter().map(super::frame::Arg::Val).collect();
        self.call_pending(call)
    }

    pub fn call_method(&mut self, obj: &ObjectRef, name: &str, args: Vec<Value>) -> Result<Value, VmError> {
        let mut call = self.method_call(obj, name, true)?;
        call.args = args.into_iter().map(super::frame::Arg::Val).collect();
        self.call_pending(call)
    }

    /// Engine-initiated method call: magic methods, iterator protocol.
    pub(crate) fn call_method_unchecked(&mut self, obj: &ObjectRef, name: &str, args: Vec<Value>) -> Result<Value, VmError> {
        let mut call = self.method_call(obj, name, false)?;
        call.args = args.into_iter().map(super::frame::Arg::Val).collect();
        self.call_pending(call)
    }

    /// `(array)` cast and `get_object_vars` view of an object.
    pub fn object_to_array(&self, obj: &ObjectRef) -> PhpArray {
        obj.props()
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (ArrayKey::from_bytes(k.as_bytes()), v)))
            .collect()
    }
}

pub(crate) fn visibility_name(v: Visibility) -> &'static str {
    match v {
        Visibility::Public => "public",
        Visibility::Protected => "protected",
        Visibility::Private => "private",
    }
}
