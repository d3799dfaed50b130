pub mod ast;
pub mod error;
pub mod ir;
pub mod location;
pub mod vm;

use std::sync::Arc;

pub use ast::AstNode;
pub use error::{generate_error_report, Level, PhpvmErrorExt};
pub use ir::{compile, CompileError, CompiledUnit};
pub use location::{Location, Span};
pub use vm::{RunSummary, RuntimeOptions, VM};

/// Compile `ast` and run it on a fresh VM, writing program output to
/// `output`.
pub fn run_ast(
    ast: &AstNode,
    file: &str,
    options: RuntimeOptions,
    output: Arc<dyn vm::OutputSink>,
) -> Result<RunSummary, Box<dyn PhpvmErrorExt>> {
    let unit = ir::compile(ast, file).map_err(|e| Box::new(e) as Box<dyn PhpvmErrorExt>)?;
    let summary = vm::run_unit(&unit, options, output).map_err(|e| Box::new(vm::VmError::from(e)) as Box<dyn PhpvmErrorExt>)?;
    Ok(summary)
}
