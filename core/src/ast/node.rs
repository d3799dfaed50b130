//! file: core/src/ast/node.rs
//! description: the syntax tree node handed over by the parser.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::location::{Location, Span};

use super::kind::AstNodeKind;

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(1);

fn next_node_id() -> usize {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// One node of a program. `id` is assigned on construction and is not part
/// of the serialized form.
#[derive(Clone, Serialize, Deserialize)]
pub struct AstNode {
    #[serde(skip, default = "next_node_id")]
    id: usize,
    #[serde(flatten)]
    pub kind: AstNodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl AstNode {
    pub fn new(kind: AstNodeKind, location: Option<Location>, span: Option<Span>) -> Self {
        AstNode { id: next_node_id(), kind, location, span }
    }

    /// Attach a bare line number, keeping the file if one was set.
    pub fn at_line(mut self, line: usize) -> Self {
        let file = self.location.take().map(|l| l.file).unwrap_or_default();
        self.location = Some(Location::at_line(file, line));
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Source line of this node, or 0 when the parser gave none.
    pub fn line(&self) -> u32 {
        self.location.as_ref().map(|l| l.line as u32).unwrap_or(0)
    }
}

/// Node ids are per-process; two trees are equal when their contents are.
impl PartialEq for AstNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.location == other.location && self.span == other.span
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) if loc.is_known() => write!(f, "{} at {}", self.kind, loc),
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Debug for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("AstNode");
        s.field("kind", &self.kind);
        if let Some(loc) = &self.location {
            s.field("location", &format_args!("{}", loc));
        }
        s.finish()
    }
}
