//! Runtime errors for the interpreter

use std::fmt;

/// Result type alias for evaluation
pub type InterpResult<T> = std::result::Result<T, RuntimeError>;

/// Runtime error during interpretation
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Source line, or 0 when no source context exists
    pub line: usize,
}

/// Kinds of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Undefined variable
    UndefinedVariable,
    /// Undefined field or method on a receiver
    UndefinedField,
    /// Operator or operation applied to incompatible kinds
    TypeError,
    /// Division or modulo by zero
    DivisionByZero,
    /// List index out of range
    IndexOutOfBounds,
    /// Argument count mismatch
    ArityMismatch,
    /// Recursion limit exceeded
    StackOverflow,
    /// break/continue escaped every loop and switch
    ControlFlow,
    /// Module failed to lex, parse, or execute
    ImportError,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, line: usize) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn undefined_variable(name: &str, line: usize) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("Undefined variable '{name}'."),
            line,
        )
    }

    pub fn undefined_field(type_name: &str, field: &str, line: usize) -> Self {
        Self::new(
            ErrorKind::UndefinedField,
            format!("Value of type '{type_name}' has no field or method named '{field}'."),
            line,
        )
    }

    pub fn type_error(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::TypeError, message, line)
    }

    pub fn division_by_zero(line: usize) -> Self {
        Self::new(ErrorKind::DivisionByZero, "Division by zero.", line)
    }

    pub fn index_out_of_bounds(line: usize) -> Self {
        Self::new(ErrorKind::IndexOutOfBounds, "Index out of bounds.", line)
    }

    pub fn arity_mismatch(name: &str, expected: usize, got: usize, line: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!("Function '{name}' expects {expected} argument(s), got {got}."),
            line,
        )
    }

    pub fn stack_overflow(line: usize) -> Self {
        Self::new(
            ErrorKind::StackOverflow,
            "Stack overflow: recursion too deep.",
            line,
        )
    }

    pub fn stray_control(what: &str, line: usize) -> Self {
        Self::new(
            ErrorKind::ControlFlow,
            format!("'{what}' outside of a loop."),
            line,
        )
    }

    pub fn import_error(name: &str, detail: &str, line: usize) -> Self {
        Self::new(
            ErrorKind::ImportError,
            format!("In module '{name}': {detail}"),
            line,
        )
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error: {}", self.line, self.message)
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_variable_message() {
        let err = RuntimeError::undefined_variable("x", 3);
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        assert_eq!(format!("{err}"), "[line 3] Error: Undefined variable 'x'.");
    }

    #[test]
    fn test_undefined_field_message() {
        let err = RuntimeError::undefined_field("instance", "speak", 9);
        assert!(err.message.contains("'instance'"));
        assert!(err.message.contains("'speak'"));
    }

    #[test]
    fn test_division_by_zero() {
        let err = RuntimeError::division_by_zero(5);
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.line, 5);
    }

    #[test]
    fn test_arity_mismatch_message() {
        let err = RuntimeError::arity_mismatch("add", 2, 3, 1);
        assert_eq!(
            err.message,
            "Function 'add' expects 2 argument(s), got 3."
        );
    }

    #[test]
    fn test_native_errors_use_line_zero() {
        let err = RuntimeError::type_error("sqrt() argument must be a number.", 0);
        assert_eq!(format!("{err}"), "[line 0] Error: sqrt() argument must be a number.");
    }
}
