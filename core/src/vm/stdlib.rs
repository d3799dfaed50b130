//! file: core/src/vm/stdlib.rs
//! description: the handful of natives the engine contract relies on.
//!
//! The real standard library is registered by the host through the same
//! `NativeFunction` interface; these are the functions the engine's own
//! behavior (callbacks, introspection, task synchronization) is defined by.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{ClassKind, Visibility};

use super::array::{ArrayKey, PhpArray};
use super::concurrency::WaitGroupHandle;
use super::convert::{self, format_float, to_int};
use super::error::{RegistryError, VmError};
use super::frame::Arg;
use super::handlers;
use super::native::{arg, expect_args, CallContext, NativeFn, NativeFunction};
use super::registry::Registry;
use super::value::Value;

type Native = fn(&mut CallContext<'_>, Vec<Value>) -> Result<Value, VmError>;

fn natives() -> Vec<Arc<dyn NativeFunction>> {
    let table: &[(&str, Native, &str, &[&str], &str)] = &[
        ("strlen", strlen, "Length of a string in bytes", &["string $string"], "int"),
        ("count", count, "Number of elements in an array or Countable", &["Countable|array $value", "int $mode = 0"], "int"),
        ("gettype", gettype, "Type name of a value", &["mixed $value"], "string"),
        ("get_class", get_class, "Class name of an object", &["object $object"], "string"),
        ("var_dump", var_dump, "Dump structured information about values", &["mixed ...$values"], "void"),
        ("call_user_func", call_user_func, "Call a callable", &["callable $callback", "mixed ...$args"], "mixed"),
        (
            "call_user_func_array",
            call_user_func_array,
            "Call a callable with an argument array",
            &["callable $callback", "array $args"],
            "mixed",
        ),
        ("func_get_args", func_get_args, "Arguments passed to the calling function", &[], "array"),
        ("func_num_args", func_num_args, "Number of arguments passed to the calling function", &[], "int"),
        ("function_exists", function_exists, "Whether a function is defined", &["string $function"], "bool"),
        ("class_exists", class_exists, "Whether a class is declared", &["string $class", "bool $autoload = true"], "bool"),
        (
            "interface_exists",
            interface_exists,
            "Whether an interface is declared",
            &["string $interface", "bool $autoload = true"],
            "bool",
        ),
        ("method_exists", method_exists, "Whether a class has a method", &["object|string $object", "string $method"], "bool"),
        ("is_callable", is_callable, "Whether a value can be called", &["mixed $value"], "bool"),
        (
            "iterator_to_array",
            iterator_to_array,
            "Copy an iterator into an array",
            &["Traversable|array $iterator", "bool $preserve_keys = true"],
            "array",
        ),
        ("spl_object_id", spl_object_id, "Integer handle of an object", &["object $object"], "int"),
        ("define", define, "Define a named constant", &["string $constant_name", "mixed $value"], "bool"),
        ("defined", defined, "Whether a named constant exists", &["string $constant_name"], "bool"),
        ("constant", constant, "Value of a named or class constant", &["string $name"], "mixed"),
        ("wait_group", wait_group, "Create a counting wait handle", &["int $count = 0"], "WaitGroup"),
        ("intdiv", intdiv, "Integer division", &["int $num1", "int $num2"], "int"),
    ];
    table
        .iter()
        .map(|(name, f, desc, args, ret)| NativeFn::new(*name, *f).describe(desc, args, ret).shared())
        .collect()
}

/// Register the core natives.
pub fn install(reg: &mut Registry) -> Result<(), RegistryError> {
    for native in natives() {
        reg.register_native(native)?;
    }
    Ok(())
}

fn name_arg(cx: &mut CallContext<'_>, args: &[Value], i: usize) -> Result<String, VmError> {
    let s = cx.ctx.to_string(&arg(args, i))?;
    Ok(s.to_string_lossy().trim_start_matches('\\').to_string())
}

fn strlen(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("strlen", &args, 1)?;
    match &args[0] {
        Value::Array(_) | Value::Object(_) | Value::Callable(_) => Err(VmError::type_error(format!(
            "strlen(): Argument #1 ($string) must be of type string, {} given",
            args[0].type_name()
        ))),
        v => Ok(Value::Int(cx.ctx.to_string(v)?.len() as i64)),
    }
}

fn count_recursive(a: &PhpArray) -> i64 {
    a.values()
        .map(|v| match v {
            Value::Array(inner) => 1 + count_recursive(inner),
            _ => 1,
        })
        .sum()
}

fn count(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("count", &args, 1)?;
    let recursive = to_int(&arg(&args, 1)) == 1;
    match &args[0] {
        Value::Array(a) if recursive => Ok(Value::Int(count_recursive(a))),
        Value::Array(a) => Ok(Value::Int(a.len() as i64)),
        Value::Object(o) if o.class().is_a("Countable") => {
            let n = cx.ctx.call_method(o, "count", Vec::new())?;
            Ok(Value::Int(to_int(&n)))
        }
        other => Err(VmError::type_error(format!(
            "count(): Argument #1 ($value) must be of type Countable|array, {} given",
            other.type_name()
        ))),
    }
}

fn gettype(_: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("gettype", &args, 1)?;
    Ok(Value::str(convert::gettype(&args[0])))
}

fn get_class(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    match args.first() {
        Some(v @ (Value::Object(_) | Value::Callable(_) | Value::Task(_) | Value::WaitGroup(_))) => Ok(Value::from(v.type_name())),
        Some(other) => Err(VmError::type_error(format!(
            "get_class(): Argument #1 ($object) must be of type object, {} given",
            other.type_name()
        ))),
        None => match cx.ctx.current_scope() {
            Some(scope) => Ok(Value::str(&scope.name)),
            None => Err(VmError::error("get_class() without arguments must be called from within a class")),
        },
    }
}

/// `var_dump` rendering. `seen` holds the ids of objects being dumped to
/// cut cycles.
#[derive(Default)]
struct Dumper {
    out: String,
    seen: HashSet<u64>,
}

impl Dumper {
    fn pad(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn entry(&mut self, label: &str, v: &Value, depth: usize) {
        self.pad(depth + 1);
        self.out.push('[');
        self.out.push_str(label);
        self.out.push_str("]=>\n");
        self.value(v, depth + 1);
    }

    fn value(&mut self, v: &Value, depth: usize) {
        self.pad(depth);
        match v {
            Value::Null => self.out.push_str("NULL\n"),
            Value::Bool(b) => self.out.push_str(&format!("bool({})\n", b)),
            Value::Int(i) => self.out.push_str(&format!("int({})\n", i)),
            Value::Float(f) => self.out.push_str(&format!("float({})\n", format_float(*f, None))),
            Value::String(s) => self.out.push_str(&format!("string({}) \"{}\"\n", s.len(), s.to_string_lossy())),
            Value::Array(a) => {
                self.out.push_str(&format!("array({}) {{\n", a.len()));
                for (k, item) in a.iter() {
                    let label = match k {
                        ArrayKey::Int(i) => i.to_string(),
                        ArrayKey::Str(s) => format!("\"{}\"", s.to_string_lossy()),
                    };
                    self.entry(&label, item, depth);
                }
                self.pad(depth);
                self.out.push_str("}\n");
            }
            Value::Object(o) => {
                if !self.seen.insert(o.id()) {
                    self.out.push_str("*RECURSION*\n");
                    return;
                }
                let props = o.props();
                self.out.push_str(&format!("object({})#{} ({}) {{\n", o.class().name, o.id(), props.len()));
                for (name, item) in props {
                    let label = match o.class().properties.get(&name) {
                        Some(p) if p.info.visibility == Visibility::Protected => format!("\"{}\":protected", name),
                        Some(p) if p.info.visibility == Visibility::Private => format!("\"{}\":\"{}\":private", name, p.declaring),
                        _ => format!("\"{}\"", name),
                    };
                    match item {
                        Some(item) => self.entry(&label, &item, depth),
                        None => {
                            self.pad(depth + 1);
                            let hint = o
                                .class()
                                .properties
                                .get(&name)
                                .and_then(|p| p.info.type_hint.as_ref().map(|h| h.to_string()))
                                .unwrap_or_else(|| "mixed".to_string());
                            self.out.push_str(&format!("[{}]=>\n", label));
                            self.pad(depth + 1);
                            self.out.push_str(&format!("uninitialized({})\n", hint));
                        }
                    }
                }
                self.pad(depth);
                self.out.push_str("}\n");
                self.seen.remove(&o.id());
            }
            Value::Resource(r) => self.out.push_str(&format!("resource({}) of type ({})\n", r.id, r.kind)),
            Value::Callable(c) => self.out.push_str(&format!("object(Closure)#{} (0) {{\n", c.id)),
            Value::Task(t) => self.out.push_str(&format!("object(Task)#{} (0) {{\n", t.id())),
            Value::WaitGroup(wg) => self.out.push_str(&format!("object(WaitGroup)#{} (1) {{\n", wg.id())),
        }
        match v {
            Value::Callable(_) | Value::Task(_) => {
                self.pad(depth);
                self.out.push_str("}\n");
            }
            Value::WaitGroup(wg) => {
                let count = Value::Int(wg.count());
                self.entry("\"count\"", &count, depth);
                self.pad(depth);
                self.out.push_str("}\n");
            }
            _ => {}
        }
    }
}

fn var_dump(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("var_dump", &args, 1)?;
    for v in &args {
        let mut d = Dumper::default();
        d.value(v, 0);
        cx.write(d.out.as_bytes());
    }
    Ok(Value::Null)
}

fn call_user_func(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("call_user_func", &args, 1)?;
    let mut args = args.into_iter();
    let callee = args.next().unwrap_or_default();
    cx.call(&callee, args.collect())
}

fn call_user_func_array(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("call_user_func_array", &args, 2)?;
    let Value::Array(list) = &args[1] else {
        return Err(VmError::type_error(format!(
            "call_user_func_array(): Argument #2 ($args) must be of type array, {} given",
            args[1].type_name()
        )));
    };
    let mut call = cx.ctx.callable_to_call(&args[0])?;
    for (k, v) in list.iter() {
        match k {
            ArrayKey::Int(_) if !call.named.is_empty() => {
                return Err(VmError::error("Cannot use positional argument after named argument during unpacking"));
            }
            ArrayKey::Int(_) => call.args.push(Arg::Val(v.clone())),
            ArrayKey::Str(name) => call.named.push((name.to_string_lossy().into_owned(), Arg::Val(v.clone()))),
        }
    }
    cx.ctx.call_pending(call)
}

fn func_get_args(cx: &mut CallContext<'_>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(Value::Array(PhpArray::from_list(cx.caller_args.iter().cloned())))
}

fn func_num_args(cx: &mut CallContext<'_>, _: Vec<Value>) -> Result<Value, VmError> {
    Ok(Value::Int(cx.caller_args.len() as i64))
}

fn function_exists(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("function_exists", &args, 1)?;
    let name = name_arg(cx, &args, 0)?;
    Ok(Value::Bool(cx.ctx.registry.function(&name).is_some()))
}

fn class_of_kind(cx: &mut CallContext<'_>, args: &[Value], kind: ClassKind) -> Result<Value, VmError> {
    let name = name_arg(cx, args, 0)?;
    Ok(Value::Bool(cx.ctx.registry.class(&name).is_some_and(|c| c.kind == kind)))
}

fn class_exists(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("class_exists", &args, 1)?;
    class_of_kind(cx, &args, ClassKind::Class)
}

fn interface_exists(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("interface_exists", &args, 1)?;
    class_of_kind(cx, &args, ClassKind::Interface)
}

fn method_exists(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("method_exists", &args, 2)?;
    let method = name_arg(cx, &args, 1)?;
    let class = match &args[0] {
        Value::Object(o) => Some(Arc::clone(o.class())),
        Value::String(s) => cx.ctx.registry.class(s.to_string_lossy().trim_start_matches('\\')),
        _ => None,
    };
    Ok(Value::Bool(class.is_some_and(|c| cx.ctx.registry.find_method(&c, &method).is_some())))
}

fn is_callable(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("is_callable", &args, 1)?;
    Ok(Value::Bool(cx.ctx.is_callable(&args[0])))
}

fn iterator_to_array(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("iterator_to_array", &args, 1)?;
    let preserve_keys = args.get(1).is_none_or(convert::to_bool);
    let source = arg(&args, 0);
    let type_name = source.type_name();
    let Some(pairs) = handlers::iterate_pairs(cx.ctx, source)? else {
        return Err(VmError::type_error(format!(
            "iterator_to_array(): Argument #1 ($iterator) must be of type Traversable|array, {} given",
            type_name
        )));
    };
    let mut out = PhpArray::with_capacity(pairs.len());
    for (k, v) in pairs {
        if !preserve_keys {
            out.push(v);
            continue;
        }
        match convert::to_array_key(&k) {
            Ok(key) => out.insert(key, v),
            Err(t) => return Err(VmError::type_error(format!("Cannot access offset of type {} on array", t))),
        }
    }
    Ok(Value::Array(out))
}

fn spl_object_id(_: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("spl_object_id", &args, 1)?;
    match &args[0] {
        Value::Object(o) => Ok(Value::Int(o.id() as i64)),
        Value::Callable(c) => Ok(Value::Int(c.id as i64)),
        other => Err(VmError::type_error(format!(
            "spl_object_id(): Argument #1 ($object) must be of type object, {} given",
            other.type_name()
        ))),
    }
}

fn define(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("define", &args, 2)?;
    let name = name_arg(cx, &args, 0)?;
    if name.contains("::") {
        return Err(VmError::raise("ValueError", "define(): Argument #1 ($constant_name) cannot be a class constant"));
    }
    if cx.ctx.classes.constants.contains_key(&name) || cx.ctx.registry.constant(&name).is_some() {
        cx.warn(&format!("Constant {} already defined", name));
        return Ok(Value::Bool(false));
    }
    log::debug!("define({})", name);
    cx.ctx.classes.constants.insert(name, args[1].clone());
    Ok(Value::Bool(true))
}

fn defined(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("defined", &args, 1)?;
    let name = name_arg(cx, &args, 0)?;
    Ok(Value::Bool(handlers::lookup_constant(cx.ctx, &name).is_some()))
}

fn constant(cx: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("constant", &args, 1)?;
    let name = name_arg(cx, &args, 0)?;
    if let Some((class, member)) = name.split_once("::") {
        let class = cx.ctx.class_by_name(class)?;
        return cx.ctx.class_constant(&class, member);
    }
    handlers::lookup_constant(cx.ctx, &name).ok_or_else(|| VmError::error(format!("Undefined constant \"{}\"", name)))
}

fn wait_group(_: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    let initial = args.first().map(to_int).unwrap_or(0);
    Ok(Value::WaitGroup(WaitGroupHandle::new(initial)?))
}

fn intdiv(_: &mut CallContext<'_>, args: Vec<Value>) -> Result<Value, VmError> {
    expect_args("intdiv", &args, 2)?;
    let (a, b) = (to_int(&args[0]), to_int(&args[1]));
    if b == 0 {
        return Err(VmError::raise("DivisionByZeroError", "Division by zero"));
    }
    match a.checked_div(b) {
        Some(q) => Ok(Value::Int(q)),
        None => Err(VmError::raise("ArithmeticError", "Division of PHP_INT_MIN by -1 is not an integer")),
    }
}
