//! # Validation Errors
//!
//! Construction-time failures for domain primitives, built with `thiserror`.
//! Each variant carries the offending input so a caller can see exactly
//! what was rejected.

use thiserror::Error;

/// Validation errors for domain primitive newtypes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Principal identifier is empty or whitespace-only.
    #[error("invalid principal: must be non-empty")]
    EmptyPrincipal,

    /// Principal identifier contains whitespace or control characters.
    #[error("invalid principal: \"{0}\" (whitespace and control characters are not allowed)")]
    MalformedPrincipal(String),

    /// Checked arithmetic on an amount overflowed or underflowed.
    #[error("amount arithmetic overflow: {lhs} {op} {rhs}")]
    AmountOverflow {
        /// Left operand.
        lhs: u64,
        /// Operator symbol.
        op: &'static str,
        /// Right operand.
        rhs: u64,
    },
}
