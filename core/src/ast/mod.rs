//! file: core/src/ast/mod.rs
//! description: parser-facing syntax tree.
//!
//! The lexer/parser lives outside this crate. It hands over a tree of
//! `AstNode`s either in memory or serialized as JSON (`from_json`).

pub mod build;
pub mod kind;
pub mod node;

pub use kind::*;
pub use node::AstNode;

/// Deserialize a tree produced by an external parser.
pub fn from_json(src: &str) -> Result<AstNode, serde_json::Error> {
    serde_json::from_str(src)
}

/// Serialize a tree, e.g. for a parser test fixture.
pub fn to_json(node: &AstNode) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(node)
}
