//! Error types for rpnkit.

use thiserror::Error;

/// Result alias for rpnkit operations.
pub type RpnResult<T> = std::result::Result<T, RpnError>;

/// Errors that can occur when running rpnkit algorithms.
///
/// Every variant signals a broken caller contract; none is recovered
/// internally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpnError {
    /// An array does not have the shape the operation requires.
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
    /// The input data violates a precondition.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// An index was outside the valid range.
    #[error("{context} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
}
