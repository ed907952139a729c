// This module defines the error taxonomy for value emission using the thiserror crate.
// Errors fall into two classes: InputError covers caller-supplied data that violates an
// operation's contract (wrong arity, mismatched types or layouts, invalid arguments such
// as modulus on floating point, use of an undefined Value) and is recoverable by the
// caller; LogicError covers internal invariant violations (illegal state, unimplemented
// operations, LLVM builder failures) and is expected to abort the current emission
// session. EmitError wraps both so callers can test the class instead of string matching.

//! Error types for value emission.

use thiserror::Error;

/// Caller-side contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("type mismatch: {reason}")]
    TypeMismatch { reason: String },

    #[error("size mismatch: {reason}")]
    SizeMismatch { reason: String },

    #[error("invalid size: {reason}")]
    InvalidSize { reason: String },

    #[error("value is empty or undefined")]
    UndefinedValue,

    #[error("function `{name}` is not defined")]
    UndefinedFunction { name: String },
}

/// Internal invariant violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogicError {
    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    #[error("not implemented: {operation}")]
    NotImplemented { operation: &'static str },

    #[error("backend failure: {reason}")]
    Backend { reason: String },
}

/// Main error type for emitter operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Logic(#[from] LogicError),
}

impl EmitError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        InputError::InvalidArgument { reason: reason.into() }.into()
    }

    pub fn type_mismatch(reason: impl Into<String>) -> Self {
        InputError::TypeMismatch { reason: reason.into() }.into()
    }

    pub fn size_mismatch(reason: impl Into<String>) -> Self {
        InputError::SizeMismatch { reason: reason.into() }.into()
    }

    pub fn invalid_size(reason: impl Into<String>) -> Self {
        InputError::InvalidSize { reason: reason.into() }.into()
    }

    pub fn illegal_state(reason: impl Into<String>) -> Self {
        LogicError::IllegalState { reason: reason.into() }.into()
    }

    pub fn not_implemented(operation: &'static str) -> Self {
        LogicError::NotImplemented { operation }.into()
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        LogicError::Backend { reason: reason.into() }.into()
    }

    /// True for errors the caller caused and may recover from.
    pub fn is_input(&self) -> bool {
        matches!(self, EmitError::Input(_))
    }

    /// True for internal invariant violations.
    pub fn is_logic(&self) -> bool {
        matches!(self, EmitError::Logic(_))
    }
}

impl From<inkwell::builder::BuilderError> for EmitError {
    fn from(err: inkwell::builder::BuilderError) -> Self {
        EmitError::backend(format!("{:?}", err))
    }
}

/// Result type alias for emitter operations.
pub type EmitResult<T> = Result<T, EmitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(EmitError::type_mismatch("f32 vs i32").is_input());
        assert!(EmitError::size_mismatch("[2] vs [3]").is_input());
        assert!(EmitError::not_implemented("unary operation").is_logic());
        assert!(!EmitError::illegal_state("no function").is_input());
    }

    #[test]
    fn test_error_messages() {
        let err = EmitError::invalid_argument("modulus on floating point");
        assert_eq!(err.to_string(), "invalid argument: modulus on floating point");

        let err: EmitError = InputError::UndefinedValue.into();
        assert_eq!(err.to_string(), "value is empty or undefined");
    }
}
