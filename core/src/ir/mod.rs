pub mod err;
pub mod function;
pub mod instruction;
pub mod lower;
pub mod op;
pub mod value;

pub use self::err::{CompileError, CompileErrorKind};
pub use self::function::{
    ClassConstant, CompiledClass, CompiledFunction, CompiledMethod, CompiledUnit, Initializer, Param,
    ParamDefault, PropertyInfo, TryRegion, TypeHint,
};
pub use self::instruction::{Instruction, Operand, OperandType};
pub use self::op::Opcode;
pub use self::value::Constant;

/// Compile a script AST into a loadable unit.
pub fn compile(ast: &crate::ast::AstNode, file: &str) -> Result<CompiledUnit, CompileError> {
    lower::compile_script(ast, file)
}
