//! file: core/src/vm/error.rs
//! description: runtime error types.
//!
//! Handlers return `VmError`. The dispatch loop turns `Raise` and `Thrown`
//! into guest exceptions and unwinds; `Fatal` and `Exit` abort the context.

use thiserror::Error;

use crate::error::{Level, PhpvmErrorExt};
use crate::location::{Location, Span};

use super::object::ObjectRef;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Cannot redeclare function {0}()")]
    DuplicateFunction(String),
    #[error("Cannot declare class {0}, because the name is already in use")]
    DuplicateClass(String),
    #[error("Class \"{parent}\" not found while declaring {class}")]
    UnknownParent { class: String, parent: String },
    #[error("Interface \"{interface}\" not found while declaring {class}")]
    UnknownInterface { class: String, interface: String },
    #[error("Trait \"{name}\" not found while declaring {class}")]
    UnknownTrait { class: String, name: String },
    #[error("the symbol registry is frozen; {0} cannot be declared once execution has started")]
    Frozen(String),
    #[error("Class {0} has an inheritance cycle")]
    InheritanceCycle(String),
    #[error("{0}")]
    Invalid(String),
}

/// Defects in the engine or the program image. Never catchable by guest code.
#[derive(Debug, Error)]
pub enum EngineFatal {
    #[error("unimplemented opcode {0}")]
    UnimplementedOpcode(String),
    #[error("{kind} operand {index} out of range in {function}")]
    OperandOutOfRange { kind: &'static str, index: u32, function: String },
    #[error("{0} writes into a constant operand")]
    ConstantWrite(String),
    #[error("stack corruption: {0}")]
    StackCorruption(String),
    #[error("{0}")]
    TypeIncompatible(String),
    #[error("Maximum function nesting level of '{0}' reached, aborting!")]
    CallDepthExceeded(usize),
    #[error("Maximum execution budget of {0} instructions exceeded")]
    StepLimitExceeded(u64),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum VmError {
    /// A guest exception object on its way up the stack.
    #[error("Uncaught {}", .0.class().name)]
    Thrown(ObjectRef),
    /// A guest exception the engine wants raised; instantiated by the
    /// dispatch loop so it records the faulting location.
    #[error("{class}: {message}")]
    Raise { class: String, message: String },
    #[error(transparent)]
    Fatal(#[from] EngineFatal),
    #[error("exit({0})")]
    Exit(i64),
}

impl VmError {
    pub fn raise(class: &str, message: impl Into<String>) -> Self {
        VmError::Raise { class: class.to_string(), message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        VmError::raise("Error", message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        VmError::raise("TypeError", message)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, VmError::Fatal(_))
    }
}

impl From<RegistryError> for VmError {
    fn from(e: RegistryError) -> Self {
        VmError::Fatal(EngineFatal::Registry(e))
    }
}

impl PhpvmErrorExt for VmError {
    fn level(&self) -> Level {
        match self {
            VmError::Fatal(_) => Level::Critical,
            VmError::Exit(_) => Level::Info,
            _ => Level::Error,
        }
    }

    fn message(&self) -> String {
        match self {
            VmError::Thrown(obj) => {
                let message = match obj.get_prop("message").flatten() {
                    Some(super::value::Value::String(s)) => s.to_string_lossy().into_owned(),
                    _ => String::new(),
                };
                format!("Uncaught {}: {}", obj.class().name, message)
            }
            other => other.to_string(),
        }
    }

    fn issuer(&self) -> String {
        "phpvm.vm".to_string()
    }

    fn span(&self) -> Option<Span> {
        None
    }

    fn location(&self) -> Option<Location> {
        match self {
            VmError::Thrown(obj) => {
                let file = obj.get_prop("file").flatten()?;
                let line = obj.get_prop("line").flatten()?;
                let (super::value::Value::String(file), super::value::Value::Int(line)) = (file, line) else {
                    return None;
                };
                Some(Location::at_line(file.to_string_lossy(), line.max(0) as usize))
            }
            _ => None,
        }
    }
}
