//! file: core/src/vm/bootstrap.rs
//! description: classes and constants every run starts with.
//!
//! Bootstrap classes are built directly as `RuntimeClass` values, parents
//! before children, and inserted ahead of any user declaration.

use std::sync::Arc;

use crate::ast::{ClassKind, Visibility};
use crate::ir::function::{Initializer, PropertyInfo};
use crate::ir::value::Constant;

use super::error::RegistryError;
use super::exception;
use super::generator;
use super::native::NativeMethodFn;
use super::registry::{MethodEntry, MethodImpl, PropertyEntry, Registry, RuntimeClass};
use super::value::Value;

pub const PHP_VERSION: &str = "8.2.0";

/// Interfaces in declaration order, with the interfaces each extends.
const INTERFACES: &[(&str, &[&str])] = &[
    ("Traversable", &[]),
    ("Iterator", &["Traversable"]),
    ("IteratorAggregate", &["Traversable"]),
    ("Countable", &[]),
    ("ArrayAccess", &[]),
    ("Stringable", &[]),
    ("Throwable", &["Stringable"]),
];

/// Exception classes that add nothing to their parent.
const THROWABLES: &[(&str, &str)] = &[
    ("ErrorException", "Exception"),
    ("LogicException", "Exception"),
    ("RuntimeException", "Exception"),
    ("InvalidArgumentException", "LogicException"),
    ("DomainException", "LogicException"),
    ("LengthException", "LogicException"),
    ("OutOfRangeException", "LogicException"),
    ("OutOfBoundsException", "RuntimeException"),
    ("RangeException", "RuntimeException"),
    ("OverflowException", "RuntimeException"),
    ("UnderflowException", "RuntimeException"),
    ("UnexpectedValueException", "RuntimeException"),
    ("TypeError", "Error"),
    ("ValueError", "Error"),
    ("ArithmeticError", "Error"),
    ("DivisionByZeroError", "ArithmeticError"),
    ("ArgumentCountError", "TypeError"),
    ("UnhandledMatchError", "Error"),
];

fn shell(reg: &Registry, name: &str, kind: ClassKind, parent: Option<&str>, interfaces: &[&str]) -> Result<RuntimeClass, RegistryError> {
    let mut class = RuntimeClass::new(name, kind);
    class.is_abstract = kind != ClassKind::Class;
    if let Some(p) = parent {
        let parent = reg
            .class(p)
            .ok_or_else(|| RegistryError::UnknownParent { class: name.to_string(), parent: p.to_string() })?;
        class.lineage.extend(parent.lineage.iter().cloned());
        class.constants = parent.constants.clone();
        class.properties = parent.properties.clone();
        class.static_props = parent.static_props.clone();
        class.parent = Some(parent);
    }
    for iface in interfaces {
        let iface = reg.class(iface).ok_or_else(|| RegistryError::UnknownInterface {
            class: name.to_string(),
            interface: iface.to_string(),
        })?;
        class.lineage.extend(iface.lineage.iter().cloned());
    }
    Ok(class)
}

fn add_methods(class: &mut RuntimeClass, methods: Vec<(&'static str, NativeMethodFn)>) {
    for (name, f) in methods {
        let entry = MethodEntry {
            name: name.to_string(),
            imp: MethodImpl::Native(f),
            declaring: class.name.clone(),
            visibility: Visibility::Public,
            is_static: false,
            is_abstract: false,
            is_final: name != "__construct" && name != "__toString",
        };
        class.methods.insert(name.to_ascii_lowercase(), Arc::new(entry));
    }
}

fn add_property(class: &mut RuntimeClass, name: &str, default: Constant, visibility: Visibility) {
    let info = PropertyInfo {
        name: name.to_string(),
        default: Some(Initializer::Literal(default)),
        visibility,
        is_static: false,
        type_hint: None,
    };
    class.properties.insert(name.to_string(), PropertyEntry { info, declaring: class.name.clone() });
}

/// The two roots of the throwable hierarchy carry the state and the
/// accessor methods; everything else inherits them.
fn throwable_root(reg: &Registry, name: &str) -> Result<RuntimeClass, RegistryError> {
    let mut class = shell(reg, name, ClassKind::Class, None, &["Throwable"])?;
    add_property(&mut class, "message", Constant::String(String::new()), Visibility::Protected);
    add_property(&mut class, "code", Constant::Int(0), Visibility::Protected);
    add_property(&mut class, "file", Constant::String(String::new()), Visibility::Protected);
    add_property(&mut class, "line", Constant::Int(0), Visibility::Protected);
    add_property(&mut class, "previous", Constant::Null, Visibility::Private);
    add_property(&mut class, "trace", Constant::Array(Vec::new()), Visibility::Private);
    add_methods(&mut class, exception::methods());
    Ok(class)
}

fn install_classes(reg: &mut Registry) -> Result<(), RegistryError> {
    reg.insert_class(RuntimeClass::new("stdClass", ClassKind::Class))?;
    for (name, parents) in INTERFACES {
        let iface = shell(reg, name, ClassKind::Interface, None, parents)?;
        reg.insert_class(iface)?;
    }

    let exception = throwable_root(reg, "Exception")?;
    reg.insert_class(exception)?;
    let error = throwable_root(reg, "Error")?;
    reg.insert_class(error)?;
    for (name, parent) in THROWABLES {
        let class = shell(reg, name, ClassKind::Class, Some(parent), &[])?;
        reg.insert_class(class)?;
    }

    let mut gen_class = shell(reg, "Generator", ClassKind::Class, None, &["Iterator"])?;
    gen_class.is_final = true;
    add_methods(&mut gen_class, generator::methods());
    reg.insert_class(gen_class)?;

    let mut closure = RuntimeClass::new("Closure", ClassKind::Class);
    closure.is_final = true;
    reg.insert_class(closure)?;
    Ok(())
}

fn install_constants(reg: &mut Registry) -> Result<(), RegistryError> {
    let version: Vec<i64> = PHP_VERSION.split('.').filter_map(|p| p.parse().ok()).collect();
    let constants: Vec<(&str, Value)> = vec![
        ("PHP_EOL", Value::str("\n")),
        ("PHP_INT_MAX", Value::Int(i64::MAX)),
        ("PHP_INT_MIN", Value::Int(i64::MIN)),
        ("PHP_INT_SIZE", Value::Int(8)),
        ("PHP_FLOAT_EPSILON", Value::Float(f64::EPSILON)),
        ("PHP_FLOAT_MAX", Value::Float(f64::MAX)),
        ("PHP_FLOAT_MIN", Value::Float(f64::MIN_POSITIVE)),
        ("PHP_FLOAT_DIG", Value::Int(15)),
        ("PHP_VERSION", Value::str(PHP_VERSION)),
        ("PHP_MAJOR_VERSION", Value::Int(version.first().copied().unwrap_or(8))),
        ("PHP_MINOR_VERSION", Value::Int(version.get(1).copied().unwrap_or(0))),
        ("PHP_OS", Value::str(std::env::consts::OS)),
        ("PHP_OS_FAMILY", Value::str(os_family())),
        ("NAN", Value::Float(f64::NAN)),
        ("INF", Value::Float(f64::INFINITY)),
        ("E_ERROR", Value::Int(1)),
        ("E_WARNING", Value::Int(2)),
        ("E_NOTICE", Value::Int(8)),
        ("E_DEPRECATED", Value::Int(8192)),
        ("E_ALL", Value::Int(32767)),
    ];
    for (name, value) in constants {
        reg.define_constant(name, value)?;
    }
    Ok(())
}

fn os_family() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" | "openbsd" | "netbsd" => "BSD",
        _ => "Unknown",
    }
}

/// Register the bootstrap classes and engine constants.
pub fn install(reg: &mut Registry) -> Result<(), RegistryError> {
    install_classes(reg)?;
    install_constants(reg)?;
    log::debug!("bootstrap installed: {} classes", reg.class_count());
    Ok(())
}
