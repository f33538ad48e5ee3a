//! # purchase-state — Safe Remote Purchase State Machine
//!
//! Implements the two-party escrow for a remote purchase. The seller posts
//! twice the item value, the buyer matches it, and both get their
//! collateral back only once the buyer confirms delivery. Walking away is
//! always more expensive than finishing honestly.
//!
//! ## State Machine
//!
//! ```text
//! Created ──(seller.abort)──────────────────▶ Inactive
//!    │
//!    └──(any.confirm_purchase, 2v)──▶ Locked ──(buyer.confirm_received)──▶ Release
//!
//! Inactive ──(seller.refund_seller)──▶ Inactive      [SettlementRule::AsObserved]
//! Release  ──(seller.refund_seller)──▶ Inactive      [SettlementRule::ReleaseThenRefund]
//! ```
//!
//! - **States** (`state.rs`): [`PurchaseState`] and the [`SettlementRule`]
//!   that decides where the seller's final refund is allowed.
//! - **Operations** (`operation.rs`): the four callable [`Operation`]s with
//!   their required [`Role`], payability, and emitted [`PurchaseEvent`].
//! - **Escrow** (`escrow.rs`): [`PurchaseEscrow`], the owned per-instance
//!   record, and its guarded transitions.
//!
//! ## Custody
//!
//! The instance never holds money. Each transition returns a
//! [`TransitionOutcome`] naming the [`Payout`] the host must perform; the
//! host tracks the custodied balance and makes the whole call atomic.

pub mod error;
pub mod escrow;
pub mod operation;
pub mod state;

pub use error::{EscrowError, FailureKind};
pub use escrow::{CallContext, PurchaseEscrow, TransitionOutcome, TransitionRecord};
pub use operation::{Operation, Payout, PurchaseEvent, Role};
pub use state::{PurchaseState, SettlementRule};
