//! file: core/src/ir/lower/mod.rs
//! description: single-pass AST -> instruction lowering.
//!
//! The walk is recursive and never backtracks. Expressions return the
//! operand that holds their value; statements leave nothing behind. Jumps
//! are emitted against labels and back-patched in `FunctionBuilder::finish`.

pub mod function_builder;
pub mod lower_expr;
pub mod lower_objects;
pub mod lower_stmt;
pub mod lowering_context;

use std::sync::Arc;

use crate::ast::{AstNode, AstNodeKind, UnaryOperator};
use crate::ir::err::{CompileError, CompileErrorKind};
use crate::ir::function::CompiledUnit;
use crate::ir::instruction::Instruction;
use crate::ir::op::Opcode;
use crate::ir::value::Constant;

pub use function_builder::{FunctionBuilder, Label};
pub use lowering_context::LoweringContext;

/// Compile a whole script into its top-level function plus every hoisted
/// function and class declaration.
pub fn compile_script(ast: &AstNode, file: &str) -> Result<CompiledUnit, CompileError> {
    let body = match &ast.kind {
        AstNodeKind::Script { body } => body,
        AstNodeKind::Block { statements } => statements,
        other => {
            return Err(malformed(ast, format!("expected a Script node, found {}", other)));
        }
    };

    let mut cx = LoweringContext::new(file);
    let mut fb = FunctionBuilder::new("{main}", file, ast.line());
    for stmt in body {
        lower_stmt::lower_stmt(&mut cx, &mut fb, stmt)?;
    }
    emit_implicit_return(&mut fb);
    let main = fb.finish()?;

    log::debug!(
        "compiled {}: {} instructions, {} functions, {} classes",
        file,
        main.instructions.len(),
        cx.functions.len(),
        cx.classes.len()
    );

    Ok(CompiledUnit {
        file: file.to_string(),
        main: Arc::new(main),
        functions: cx.functions,
        classes: cx.classes,
    })
}

pub(crate) fn emit_implicit_return(fb: &mut FunctionBuilder) {
    let null = fb.null_const();
    fb.emit(Instruction::new(Opcode::Return).with_op1(null));
}

pub(crate) fn malformed(node: &AstNode, message: impl Into<String>) -> CompileError {
    CompileError::new(CompileErrorKind::MalformedAst, message, node.location.clone())
        .with_span(node.span.clone())
}

pub(crate) fn invalid(node: &AstNode, message: impl Into<String>) -> CompileError {
    CompileError::new(CompileErrorKind::InvalidContext, message, node.location.clone())
        .with_span(node.span.clone())
}

pub(crate) fn unsupported(node: &AstNode, message: impl Into<String>) -> CompileError {
    CompileError::new(CompileErrorKind::Unsupported, message, node.location.clone())
        .with_span(node.span.clone())
}

/// Strips a leading namespace separator from a class or function name.
pub(crate) fn plain_name(name: &str) -> &str {
    name.trim_start_matches('\\')
}

/// Fold a node into a constant when it is a literal (or a literal array).
pub fn literal_constant(node: &AstNode) -> Option<Constant> {
    match &node.kind {
        AstNodeKind::Integer { value } => Some(Constant::Int(*value)),
        AstNodeKind::Float { value } => Some(Constant::Float(*value)),
        AstNodeKind::String { value } => Some(Constant::String(value.clone())),
        AstNodeKind::Bool { value } => Some(Constant::Bool(*value)),
        AstNodeKind::Null => Some(Constant::Null),
        AstNodeKind::Name { name } => match name.to_ascii_lowercase().as_str() {
            "true" => Some(Constant::Bool(true)),
            "false" => Some(Constant::Bool(false)),
            "null" => Some(Constant::Null),
            _ => None,
        },
        AstNodeKind::UnaryOp { op: UnaryOperator::Minus, expr } => match &expr.kind {
            AstNodeKind::Integer { value } => Some(
                value.checked_neg().map(Constant::Int).unwrap_or(Constant::Float(-(*value as f64))),
            ),
            AstNodeKind::Float { value } => Some(Constant::Float(-value)),
            _ => None,
        },
        AstNodeKind::ArrayLiteral { items } => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if item.by_ref || item.unpack {
                    return None;
                }
                let key = match &item.key {
                    Some(k) => Some(literal_constant(k)?),
                    None => None,
                };
                out.push((key, literal_constant(&item.value)?));
            }
            Some(Constant::Array(out))
        }
        _ => None,
    }
}

/// Direct children of a node, in source order. Nested function and class
/// declarations are opaque.
pub(crate) fn children(node: &AstNode) -> Vec<&AstNode> {
    use AstNodeKind as K;
    let mut out: Vec<&AstNode> = Vec::new();
    match &node.kind {
        K::Script { body } => out.extend(body.iter()),
        K::Block { statements } => out.extend(statements.iter()),
        K::Echo { args } => out.extend(args.iter()),
        K::ExprStmt { expr }
        | K::Empty { expr }
        | K::Cast { expr, .. }
        | K::Clone { expr }
        | K::Print { expr }
        | K::Throw { expr }
        | K::YieldFrom { expr }
        | K::Await { expr }
        | K::UnaryOp { expr, .. } => out.push(expr),
        K::If { condition, then_branch, else_branch } => {
            out.push(condition);
            out.push(then_branch);
            if let Some(e) = else_branch {
                out.push(e);
            }
        }
        K::While { condition, body } | K::DoWhile { body, condition } => {
            out.push(condition);
            out.push(body);
        }
        K::For { init, condition, step, body } => {
            out.extend(init.iter());
            out.extend(condition.iter());
            out.extend(step.iter());
            out.push(body);
        }
        K::Foreach { subject, key, value, body, .. } => {
            out.push(subject);
            if let Some(k) = key {
                out.push(k);
            }
            out.push(value);
            out.push(body);
        }
        K::Switch { subject, cases } => {
            out.push(subject);
            for c in cases {
                if let Some(t) = &c.test {
                    out.push(t);
                }
                out.extend(c.body.iter());
            }
        }
        K::Return { value } | K::Exit { value } => {
            if let Some(v) = value {
                out.push(v);
            }
        }
        K::StaticVar { vars } => out.extend(vars.iter().filter_map(|v| v.default.as_ref())),
        K::Unset { targets } | K::Isset { targets } => out.extend(targets.iter()),
        K::Try { body, catches, finally } => {
            out.push(body);
            out.extend(catches.iter().map(|c| c.body.as_ref()));
            if let Some(f) = finally {
                out.push(f);
            }
        }
        K::ConstDecl { value, .. } => out.push(value),
        K::VariableVariable { name } => out.push(name),
        K::Interpolated { parts } => out.extend(parts.iter()),
        K::ArrayLiteral { items } => {
            for item in items {
                if let Some(k) = &item.key {
                    out.push(k);
                }
                out.push(&item.value);
            }
        }
        K::List { items } => {
            for item in items.iter().flatten() {
                if let Some(k) = &item.key {
                    out.push(k);
                }
                out.push(&item.value);
            }
        }
        K::Assign { target, value }
        | K::AssignRef { target, value }
        | K::CompoundAssign { target, value, .. } => {
            out.push(target);
            out.push(value);
        }
        K::BinaryOp { left, right, .. } => {
            out.push(left);
            out.push(right);
        }
        K::IncDec { target, .. } => out.push(target),
        K::Ternary { condition, then, otherwise } => {
            out.push(condition);
            if let Some(t) = then {
                out.push(t);
            }
            out.push(otherwise);
        }
        K::Call { callee, args } => {
            out.push(callee);
            out.extend(args.iter().map(|a| &a.value));
        }
        K::PropertyFetch { object, property, .. } => {
            out.push(object);
            out.push(property);
        }
        K::MethodCall { object, method, args, .. } => {
            out.push(object);
            out.push(method);
            out.extend(args.iter().map(|a| &a.value));
        }
        K::StaticCall { class, args, .. } | K::New { class, args } => {
            out.push(class);
            out.extend(args.iter().map(|a| &a.value));
        }
        K::StaticPropertyFetch { class, .. } | K::ClassConstFetch { class, .. } => out.push(class),
        K::Index { base, index } => {
            out.push(base);
            if let Some(i) = index {
                out.push(i);
            }
        }
        K::Instanceof { expr, class } => {
            out.push(expr);
            out.push(class);
        }
        K::Match { subject, arms } => {
            out.push(subject);
            for arm in arms {
                if let Some(conds) = &arm.conditions {
                    out.extend(conds.iter());
                }
                out.push(&arm.body);
            }
        }
        K::Yield { key, value } => {
            if let Some(k) = key {
                out.push(k);
            }
            if let Some(v) = value {
                out.push(v);
            }
        }
        K::Spawn { call } => out.push(call),
        // closures and arrow functions are scopes of their own
        K::Closure { .. } | K::ArrowFn { .. } => {}
        K::FunctionDecl(_) | K::ClassDecl(_) => {}
        K::Nop
        | K::InlineHtml { .. }
        | K::Break { .. }
        | K::Continue { .. }
        | K::Global { .. }
        | K::Variable { .. }
        | K::Integer { .. }
        | K::Float { .. }
        | K::String { .. }
        | K::Bool { .. }
        | K::Null
        | K::Name { .. }
        | K::MagicConst { .. } => {}
    }
    out
}
