//! file: core/src/vm/exception.rs
//! description: the `Throwable` method set and uncaught-exception reports.
//!
//! `Exception` and `Error` keep their state in ordinary properties
//! (`message`, `code`, `previous`, `file`, `line`, `trace`); `file`, `line`
//! and `trace` are filled in by `ExecutionContext::instantiate`.

use super::array::{ArrayKey, PhpArray};
use super::context::ExecutionContext;
use super::convert::to_int;
use super::error::VmError;
use super::native::NativeMethodFn;
use super::object::ObjectRef;
use super::value::Value;

fn prop(obj: &ObjectRef, name: &str) -> Value {
    obj.get_prop(name).flatten().unwrap_or_default()
}

fn string_prop(obj: &ObjectRef, name: &str) -> String {
    match prop(obj, name) {
        Value::String(s) => s.to_string_lossy().into_owned(),
        Value::Int(i) => i.to_string(),
        _ => String::new(),
    }
}

fn this_throwable(this: Option<&ObjectRef>) -> Result<ObjectRef, VmError> {
    this.cloned().ok_or_else(|| VmError::error("Throwable method called without an instance"))
}

fn construct(ctx: &mut ExecutionContext, this: Option<&ObjectRef>, args: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_throwable(this)?;
    let mut args = args.into_iter();
    if let Some(message) = args.next() {
        let message = ctx.to_string(&message)?;
        obj.set_prop("message", Value::String(message));
    }
    if let Some(code) = args.next() {
        obj.set_prop("code", Value::Int(to_int(&code)));
    }
    match args.next() {
        Some(Value::Object(prev)) if prev.class().is_a("Throwable") => obj.set_prop("previous", Value::Object(prev)),
        Some(Value::Null) | None => {}
        Some(other) => {
            return Err(VmError::type_error(format!(
                "{}::__construct(): Argument #3 ($previous) must be of type ?Throwable, {} given",
                obj.class().name,
                other.type_name()
            )));
        }
    }
    Ok(Value::Null)
}

fn get_message(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(prop(&this_throwable(this)?, "message"))
}

fn get_code(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(prop(&this_throwable(this)?, "code"))
}

fn get_previous(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(prop(&this_throwable(this)?, "previous"))
}

fn get_file(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(prop(&this_throwable(this)?, "file"))
}

fn get_line(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(prop(&this_throwable(this)?, "line"))
}

fn get_trace(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    match prop(&this_throwable(this)?, "trace") {
        Value::Array(a) => Ok(Value::Array(a)),
        _ => Ok(Value::Array(PhpArray::new())),
    }
}

fn get_trace_as_string(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(Value::from(trace_as_string(&this_throwable(this)?)))
}

fn to_string(_: &mut ExecutionContext, this: Option<&ObjectRef>, _: Vec<Value>) -> Result<Value, VmError> {
    let obj = this_throwable(this)?;
    Ok(Value::from(describe(&obj)))
}

/// Native methods shared by `Exception` and `Error`.
pub(crate) fn methods() -> Vec<(&'static str, NativeMethodFn)> {
    vec![
        ("__construct", construct as NativeMethodFn),
        ("getMessage", get_message),
        ("getCode", get_code),
        ("getPrevious", get_previous),
        ("getFile", get_file),
        ("getLine", get_line),
        ("getTrace", get_trace),
        ("getTraceAsString", get_trace_as_string),
        ("__toString", to_string),
    ]
}

fn frame_label(frame: &PhpArray) -> String {
    let text = |k: &str| match frame.get(&ArrayKey::from(k)) {
        Some(Value::String(s)) => s.to_string_lossy().into_owned(),
        Some(Value::Int(i)) => i.to_string(),
        _ => String::new(),
    };
    let function = text("function");
    let call = match frame.get(&ArrayKey::from("class")) {
        Some(_) => format!("{}{}{}", text("class"), text("type"), function),
        None => function,
    };
    format!("{}({}): {}()", text("file"), text("line"), call)
}

/// `#0 file(line): func()` lines ending with `{main}`.
pub fn trace_as_string(exc: &ObjectRef) -> String {
    let mut lines = Vec::new();
    if let Value::Array(trace) = prop(exc, "trace") {
        for frame in trace.values() {
            if let Value::Array(frame) = frame {
                lines.push(format!("#{} {}", lines.len(), frame_label(frame)));
            }
        }
    }
    lines.push(format!("#{} {{main}}", lines.len()));
    lines.join("\n")
}

/// `Class: message in file:line` plus the stack trace, as `__toString`
/// renders it.
pub fn describe(exc: &ObjectRef) -> String {
    let message = string_prop(exc, "message");
    let head = if message.is_empty() {
        format!("{} in {}:{}", exc.class().name, string_prop(exc, "file"), string_prop(exc, "line"))
    } else {
        format!("{}: {} in {}:{}", exc.class().name, message, string_prop(exc, "file"), string_prop(exc, "line"))
    };
    format!("{}\nStack trace:\n{}", head, trace_as_string(exc))
}

/// The fatal-error report printed when an exception leaves the script.
pub fn uncaught_report(exc: &ObjectRef) -> String {
    format!(
        "PHP Fatal error:  Uncaught {}\n  thrown in {} on line {}\n",
        describe(exc),
        string_prop(exc, "file"),
        string_prop(exc, "line")
    )
}
