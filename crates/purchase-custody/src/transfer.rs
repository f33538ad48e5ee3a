//! # Transfer Hooks
//!
//! A payout is offered to its recipient before the ledger is written. The
//! recipient may refuse (a wallet that cannot receive, a frozen account),
//! in which case the host fails the entire call and restores the escrow.
//!
//! Hooks run while the escrow's non-reentrant guard is held. A hook that
//! calls back into the same escrow gets [`HostError::Reentrant`]. Calls into
//! other escrows proceed when those escrows are idle and fail with
//! [`HostError::Busy`] when another thread is running them.
//!
//! [`HostError::Reentrant`]: crate::HostError::Reentrant
//! [`HostError::Busy`]: crate::HostError::Busy

use purchase_core::EscrowId;
use purchase_state::Payout;

/// Receives payouts leaving escrow custody.
pub trait Recipient: Send + Sync {
    /// Accept or refuse `payout` from `escrow`. `Err` carries the reason.
    fn accept(&self, escrow: EscrowId, payout: &Payout) -> Result<(), String>;
}

/// Accepts every transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Recipient for AcceptAll {
    fn accept(&self, _escrow: EscrowId, _payout: &Payout) -> Result<(), String> {
        Ok(())
    }
}

impl<F> Recipient for F
where
    F: Fn(EscrowId, &Payout) -> Result<(), String> + Send + Sync,
{
    fn accept(&self, escrow: EscrowId, payout: &Payout) -> Result<(), String> {
        self(escrow, payout)
    }
}
