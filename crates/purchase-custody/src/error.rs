//! # Host Error Types
//!
//! Failures of a hosted call. Guard failures from the state machine pass
//! through unchanged as [`HostError::Escrow`]; the remaining variants are
//! custody failures detected by the host. Every variant means the call had
//! no effect.

use thiserror::Error;

use purchase_core::{EscrowId, ValidationError};
use purchase_state::{EscrowError, FailureKind};

/// Errors arising from hosted escrow calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The state machine rejected the call.
    #[error(transparent)]
    Escrow(#[from] EscrowError),

    /// No escrow is registered under this identifier.
    #[error("unknown escrow {0}")]
    UnknownEscrow(EscrowId),

    /// Caller's wallet cannot cover the attached amount.
    #[error("{principal} has {available} but attached {required}")]
    InsufficientFunds {
        /// The paying principal.
        principal: String,
        /// Amount the call needs.
        required: u64,
        /// Amount in the wallet.
        available: u64,
    },

    /// Escrow custody cannot cover the mandated payout.
    #[error("escrow {escrow_id} holds {available} but must pay out {required}")]
    InsufficientCustody {
        /// The escrow instance.
        escrow_id: String,
        /// Payout amount.
        required: u64,
        /// Custodied balance.
        available: u64,
    },

    /// The payout recipient refused the transfer.
    #[error("transfer of {amount} from escrow {escrow_id} to {recipient} rejected: {reason}")]
    TransferRejected {
        /// The escrow instance.
        escrow_id: String,
        /// Intended recipient.
        recipient: String,
        /// Payout amount.
        amount: u64,
        /// Reason given by the recipient.
        reason: String,
    },

    /// A call re-entered an escrow that is still executing a call.
    #[error("re-entrant {operation} on escrow {escrow_id}")]
    Reentrant {
        /// The escrow instance.
        escrow_id: String,
        /// The operation attempted from inside the running call.
        operation: &'static str,
    },

    /// A hook called into an escrow that another thread is executing.
    #[error("escrow {escrow_id} busy; {operation} refused from a nested call")]
    Busy {
        /// The escrow instance.
        escrow_id: String,
        /// The operation attempted from inside the hook.
        operation: &'static str,
    },

    /// Domain primitive validation failure (balance overflow).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl HostError {
    /// The state machine's failure classification, if this is a guard failure.
    pub fn escrow_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Escrow(e) => Some(e.kind()),
            _ => None,
        }
    }
}
