//! file: core/src/vm/native.rs
//! description: native callable trait and the call context handed to it.
//!
//! Standard-library functions live outside the engine and are registered
//! through `NativeFunction`. Every call receives a `CallContext` giving
//! access to the running execution context (globals, warnings, callbacks
//! into guest code) plus the evaluated argument list.

use std::sync::Arc;

use super::context::ExecutionContext;
use super::error::VmError;
use super::object::ObjectRef;
use super::value::Value;

pub trait NativeFunction: Send + Sync {
    /// Name the function is registered under (case-insensitive at lookup).
    fn name(&self) -> &str;

    fn call(&self, cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError>;

    /// Optional metadata for diagnostics and listings.
    fn metadata(&self) -> NativeMetadata {
        NativeMetadata::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NativeMetadata {
    pub description: String,
    pub arguments: Vec<String>,
    pub returns: String,
}

/// Native implementation of a method on a bootstrap class.
pub type NativeMethodFn = fn(&mut ExecutionContext, Option<&ObjectRef>, Vec<Value>) -> Result<Value, VmError>;

/// Adapter turning a plain function pointer into a `NativeFunction`.
pub struct NativeFn {
    name: String,
    func: fn(&mut CallContext<'_>, Vec<Value>) -> Result<Value, VmError>,
    metadata: NativeMetadata,
}

impl NativeFn {
    pub fn new(name: impl Into<String>, func: fn(&mut CallContext<'_>, Vec<Value>) -> Result<Value, VmError>) -> Self {
        NativeFn { name: name.into(), func, metadata: NativeMetadata::default() }
    }

    pub fn describe(mut self, description: &str, arguments: &[&str], returns: &str) -> Self {
        self.metadata = NativeMetadata {
            description: description.to_string(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
            returns: returns.to_string(),
        };
        self
    }

    pub fn shared(self) -> Arc<dyn NativeFunction> {
        Arc::new(self)
    }
}

impl NativeFunction for NativeFn {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
        (self.func)(cx, args)
    }

    fn metadata(&self) -> NativeMetadata {
        self.metadata.clone()
    }
}

/// What a native callable sees of the engine.
pub struct CallContext<'a> {
    pub ctx: &'a mut ExecutionContext,
    /// Arguments of the calling guest frame (`func_get_args`).
    pub caller_args: Vec<Value>,
}

impl<'a> CallContext<'a> {
    pub fn new(ctx: &'a mut ExecutionContext, caller_args: Vec<Value>) -> Self {
        CallContext { ctx, caller_args }
    }

    /// Call back into guest code.
    pub fn call(&mut self, callable: &Value, args: Vec<Value>) -> Result<Value, VmError> {
        self.ctx.call_value(callable, args)
    }

    pub fn warn(&mut self, message: &str) {
        self.ctx.warn(message);
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.ctx.echo_bytes(bytes);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.ctx.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.ctx.globals.entry(name).set(value);
    }
}

/// Argument helpers shared by the core natives.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

pub(crate) fn expect_args(name: &str, args: &[Value], min: usize) -> Result<(), VmError> {
    if args.len() < min {
        return Err(VmError::raise(
            "ArgumentCountError",
            format!(
                "{}() expects {} {} argument{}, {} given",
                name,
                if min == 1 { "exactly" } else { "at least" },
                min,
                if min == 1 { "" } else { "s" },
                args.len()
            ),
        ));
    }
    Ok(())
}
