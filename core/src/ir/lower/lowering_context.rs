//! file: core/src/ir/lower/lowering_context.rs
//! description: unit-level state shared by the lowering passes.
//!
//! `LoweringContext` collects hoisted declarations while the single pass
//! walks the tree, and tracks the class currently being compiled so that
//! `self`, `parent` and the magic constants resolve.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ir::err::{CompileError, CompileErrorKind};
use crate::ir::function::{CompiledClass, CompiledFunction};
use crate::location::Location;

#[derive(Debug, Clone)]
pub struct ClassScope {
    pub name: String,
    pub parent: Option<String>,
    pub is_trait: bool,
}

#[derive(Debug, Default)]
pub struct LoweringContext {
    pub file: String,
    pub functions: Vec<Arc<CompiledFunction>>,
    function_names: HashSet<String>,
    pub classes: Vec<Arc<CompiledClass>>,
    class_names: HashSet<String>,
    pub class_stack: Vec<ClassScope>,
    /// Name of the function being compiled, for `__FUNCTION__`.
    pub function_stack: Vec<String>,
}

impl LoweringContext {
    pub fn new(file: impl Into<String>) -> Self {
        LoweringContext { file: file.into(), ..LoweringContext::default() }
    }

    pub fn current_class(&self) -> Option<&ClassScope> {
        self.class_stack.last()
    }

    pub fn register_function(&mut self, func: CompiledFunction, location: Option<Location>) -> Result<(), CompileError> {
        let key = func.name.to_ascii_lowercase();
        if !self.function_names.insert(key) {
            return Err(CompileError::new(
                CompileErrorKind::DuplicateDeclaration,
                format!("Cannot redeclare function {}()", func.name),
                location,
            ));
        }
        log::debug!("hoisted function {}", func.name);
        self.functions.push(Arc::new(func));
        Ok(())
    }

    pub fn register_class(&mut self, class: CompiledClass, location: Option<Location>) -> Result<(), CompileError> {
        if !self.class_names.insert(class.name.clone()) {
            return Err(CompileError::new(
                CompileErrorKind::DuplicateDeclaration,
                format!("Cannot declare class {}, because the name is already in use", class.name),
                location,
            ));
        }
        log::debug!("hoisted class {}", class.name);
        self.classes.push(Arc::new(class));
        Ok(())
    }
}
