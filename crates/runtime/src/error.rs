//! Runtime diagnostics: the error type the VM raises, and a thread-local
//! "last error" slot so a host embedding the VM can retrieve the most
//! recent failure without the VM itself panicking (same pattern the
//! toolchain's lexer/compiler errors use, generalized to a single global
//! accessor since the VM is the one stage with exactly one live instance
//! per thread, per §7).

use osfl_core::SourceLocation;
use std::cell::RefCell;
use std::fmt;

#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        RuntimeError {
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "Error in {} at line {}, column {}: {}",
                loc.file, loc.line, loc.column, self.message
            ),
            None => write!(f, "Error: {}", self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

thread_local! {
    static LAST_ERROR: RefCell<Option<RuntimeError>> = const { RefCell::new(None) };
}

pub fn set_runtime_error(error: RuntimeError) {
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(error));
}

pub fn take_runtime_error() -> Option<RuntimeError> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

pub fn has_runtime_error() -> bool {
    LAST_ERROR.with(|e| e.borrow().is_some())
}

pub fn clear_runtime_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_take_roundtrips() {
        clear_runtime_error();
        assert!(!has_runtime_error());
        set_runtime_error(RuntimeError::new("boom", None));
        assert!(has_runtime_error());
        let err = take_runtime_error().unwrap();
        assert_eq!(err.message, "boom");
        assert!(!has_runtime_error());
    }

    #[test]
    fn display_matches_diagnostic_format() {
        let loc = SourceLocation::new("main.osfl".to_string(), 3, 7);
        let err = RuntimeError::new("division by zero", Some(loc));
        assert_eq!(err.to_string(), "Error in main.osfl at line 3, column 7: division by zero");
    }
}
