//! # Escrow Error Types
//!
//! Every guard failure carries the operation that was attempted and the
//! fact that made it fail: the caller and the role it lacked, the current
//! and required state, or the attached amount and what was expected.

use thiserror::Error;

use purchase_core::ValidationError;

use crate::operation::Role;
use crate::state::PurchaseState;

/// Errors arising from escrow transitions.
///
/// All of these are detected before the instance is mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Caller lacks the role the operation requires.
    #[error("{operation}: caller {caller} is not the {required}")]
    Unauthorized {
        /// The attempted operation.
        operation: &'static str,
        /// The principal that made the call.
        caller: String,
        /// The role the operation requires.
        required: Role,
    },

    /// Current state does not permit the operation.
    #[error("{operation}: not permitted in state {state} (requires {expected})")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The current state.
        state: PurchaseState,
        /// The state the operation requires.
        expected: PurchaseState,
    },

    /// The seller's final payout was already made for this instance.
    #[error("{operation}: seller already refunded for escrow {escrow_id}")]
    AlreadyRefunded {
        /// The attempted operation.
        operation: &'static str,
        /// The escrow instance.
        escrow_id: String,
    },

    /// Attached or deposited amount does not match what the operation requires.
    #[error("{operation}: invalid amount {attached}: {reason}")]
    InvalidAmount {
        /// The attempted operation.
        operation: &'static str,
        /// The amount supplied by the caller.
        attached: u64,
        /// What was expected instead.
        reason: String,
    },

    /// Domain primitive validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// The coarse failure taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Caller lacks the required role.
    Unauthorized,
    /// State precondition failed.
    InvalidState,
    /// Amount precondition failed.
    InvalidAmount,
}

impl EscrowError {
    /// Classify this error into the caller-facing taxonomy.
    ///
    /// A repeated seller refund is a state precondition; arithmetic overflow
    /// is an amount precondition.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unauthorized { .. } => FailureKind::Unauthorized,
            Self::InvalidState { .. } | Self::AlreadyRefunded { .. } => FailureKind::InvalidState,
            Self::InvalidAmount { .. } | Self::Validation(_) => FailureKind::InvalidAmount,
        }
    }
}
