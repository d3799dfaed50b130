use crate::error::{Level, PhpvmErrorExt};
use crate::location::{Location, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    MalformedAst,
    UnresolvedLabel,
    DuplicateDeclaration,
    InvalidContext,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct CompileError {
    kind: CompileErrorKind,
    level: Level,
    message: String,
    issuer: String,
    location: Option<Location>,
    span: Option<Span>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>, location: Option<Location>) -> Self {
        CompileError {
            kind,
            level: Level::Error,
            message: message.into(),
            issuer: "phpvm.compiler".to_string(),
            location,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn kind(&self) -> CompileErrorKind {
        self.kind
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} on line {} of {}", self.message, loc.line, loc.file),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

impl PhpvmErrorExt for CompileError {
    fn level(&self) -> Level {
        self.level
    }
    fn message(&self) -> String {
        self.message.clone()
    }
    fn issuer(&self) -> String {
        self.issuer.clone()
    }
    fn span(&self) -> Option<Span> {
        self.span.clone()
    }
    fn location(&self) -> Option<Location> {
        self.location.clone()
    }
}
