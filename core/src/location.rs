//! file: core/src/location.rs
//! description: source positions attached by the external parser.

use serde::{Deserialize, Serialize};

/// A point in a source file. Lines start at 1; 0 means unknown. A column of
/// 0 means the parser only tracks lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    #[serde(default)]
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self { file: file.into(), line, column }
    }

    /// A position known only to line precision.
    pub fn at_line(file: impl Into<String>, line: usize) -> Self {
        Self::new(file, line, 0)
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.column {
            0 => write!(f, "{}:{}", self.file, self.line),
            col => write!(f, "{}:{}:{}", self.file, self.line, col),
        }
    }
}

/// Source range of a node, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start.file == self.end.file && self.start.line == self.end.line {
            return write!(f, "{}", self.start);
        }
        write!(f, "{} - {}", self.start, self.end)
    }
}
