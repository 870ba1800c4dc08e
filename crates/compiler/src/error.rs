//! Compiler-stage errors. Hand-rolled rather than built on `thiserror`,
//! matching the rest of the toolchain's error types.

use osfl_core::SourceLocation;
use std::fmt;

#[derive(Debug, Clone)]
pub enum CompileError {
    Parse {
        message: String,
        location: SourceLocation,
    },
    DuplicateName {
        name: String,
        location: SourceLocation,
        previous: SourceLocation,
    },
    UndefinedName {
        name: String,
        location: SourceLocation,
    },
    InvalidAssignmentTarget {
        location: SourceLocation,
    },
    TooManyFunctions {
        limit: usize,
    },
    TooManyRegisters {
        function: String,
        limit: u8,
    },
    MissingMain,
    BreakOutsideLoop {
        location: SourceLocation,
    },
    ContinueOutsideLoop {
        location: SourceLocation,
    },
    /// Semantic diagnostics (undefined names, a missing nested `main`, ...)
    /// accumulated during a compile that otherwise ran to completion.
    /// Compilation itself never aborts on these; `compile()` only returns
    /// this once, at the end, if the accumulator is non-empty.
    Diagnostics(Vec<CompileError>),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse { message, location } => {
                write!(f, "{location}: {message}")
            }
            CompileError::DuplicateName { name, location, previous } => {
                write!(f, "{location}: '{name}' is already declared in this scope (first declared at {previous})")
            }
            CompileError::UndefinedName { name, location } => {
                write!(f, "{location}: undefined name '{name}'")
            }
            CompileError::InvalidAssignmentTarget { location } => {
                write!(f, "{location}: invalid assignment target")
            }
            CompileError::TooManyFunctions { limit } => {
                write!(f, "program declares more than {limit} functions")
            }
            CompileError::TooManyRegisters { function, limit } => {
                write!(f, "function '{function}' needs more than {limit} registers")
            }
            CompileError::MissingMain => write!(f, "program has no 'main' frame"),
            CompileError::BreakOutsideLoop { location } => {
                write!(f, "{location}: 'break' outside a loop")
            }
            CompileError::ContinueOutsideLoop { location } => {
                write!(f, "{location}: 'continue' outside a loop")
            }
            CompileError::Diagnostics(errors) => {
                writeln!(f, "{} diagnostic(s) reported during compilation:", errors.len())?;
                for (index, error) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {error}", index + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<crate::parser::ParseError> for CompileError {
    fn from(err: crate::parser::ParseError) -> Self {
        CompileError::Parse {
            message: err.message,
            location: err.location,
        }
    }
}
