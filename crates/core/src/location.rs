//! Source positions.

use std::fmt;

/// A `(file, line, column)` triple, 1-based, attached to every token and AST
/// node so any diagnostic can be rendered without consulting external state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }

    /// A placeholder location for synthetic nodes (e.g. the implicit `HALT`
    /// appended after compilation). Never produced by the lexer.
    pub fn synthetic() -> Self {
        SourceLocation {
            file: String::new(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}, column {}", self.file, self.line, self.column)
    }
}
