//! # Purchase Escrow
//!
//! One escrow instance: one item, one seller, at most one buyer.
//!
//! ## Guard Order
//!
//! Every operation checks, in order, the caller's role, the current state,
//! and the attached amount. Anything fallible (including payout arithmetic)
//! is evaluated before the first field is written, so a rejected call leaves
//! the instance byte-for-byte unchanged.
//!
//! ## Payout Arithmetic
//!
//! | Transition         | Payout            |
//! |--------------------|-------------------|
//! | `abort`            | entire custody → seller |
//! | `confirm_received` | `value` → buyer   |
//! | `refund_seller`    | `3 * value` → seller |
//!
//! The instance updates its own state before handing the payout back, and
//! the host performs the transfer afterwards.

use serde::{Deserialize, Serialize};

use purchase_core::{Amount, EscrowId, Principal, Timestamp};

use crate::error::EscrowError;
use crate::operation::{Operation, Payout, PurchaseEvent, Role};
use crate::state::{PurchaseState, SettlementRule};

// ─── Call Context ────────────────────────────────────────────────────

/// What the host knows about one incoming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Verified identity of the caller.
    pub caller: Principal,
    /// Amount attached to the call.
    pub attached: Amount,
    /// Custodied balance of the instance before `attached` is deposited.
    pub custody: Amount,
}

impl CallContext {
    /// Build a call context.
    pub fn new(caller: Principal, attached: Amount, custody: Amount) -> Self {
        Self {
            caller,
            attached,
            custody,
        }
    }
}

// ─── Records ─────────────────────────────────────────────────────────

/// Record of an accepted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Operation that caused the transition.
    pub operation: Operation,
    /// Principal that called it.
    pub actor: Principal,
    /// State before the transition.
    pub from_state: PurchaseState,
    /// State after the transition.
    pub to_state: PurchaseState,
    /// Amount attached to the call.
    pub attached: Amount,
    /// When the transition occurred.
    pub timestamp: Timestamp,
}

/// Result of an accepted transition, handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    /// Operation that was applied.
    pub operation: Operation,
    /// State before.
    pub from: PurchaseState,
    /// State after.
    pub to: PurchaseState,
    /// Notification to publish once the call commits.
    pub event: PurchaseEvent,
    /// Transfer out of custody the host must perform, if any.
    pub payout: Option<Payout>,
}

// ─── Escrow ──────────────────────────────────────────────────────────

/// A safe remote purchase escrow instance.
///
/// `value`, `seller`, and `settlement_rule` are fixed at construction;
/// `buyer` is written exactly once, by `confirm_purchase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEscrow {
    id: EscrowId,
    value: Amount,
    seller: Principal,
    buyer: Option<Principal>,
    state: PurchaseState,
    settlement_rule: SettlementRule,
    seller_refunded: bool,
    created_at: Timestamp,
    transitions: Vec<TransitionRecord>,
}

impl PurchaseEscrow {
    /// Open a new escrow with the seller's `deposit`.
    ///
    /// The item value is `deposit / 2`.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidAmount`] if the deposit is zero, odd,
    /// or so large that the seller's `3 * value` payout would overflow.
    pub fn create(
        seller: Principal,
        deposit: Amount,
        settlement_rule: SettlementRule,
    ) -> Result<Self, EscrowError> {
        const OP: &str = "create";
        if deposit.is_zero() {
            return Err(EscrowError::InvalidAmount {
                operation: OP,
                attached: deposit.units(),
                reason: "deposit must be strictly positive".to_string(),
            });
        }
        let value = deposit
            .exact_half()
            .ok_or_else(|| EscrowError::InvalidAmount {
                operation: OP,
                attached: deposit.units(),
                reason: "deposit must be even so that value = deposit / 2 is exact".to_string(),
            })?;
        if value.checked_mul(3).is_err() {
            return Err(EscrowError::InvalidAmount {
                operation: OP,
                attached: deposit.units(),
                reason: "seller payout of 3 * value would overflow".to_string(),
            });
        }

        Ok(Self {
            id: EscrowId::new(),
            value,
            seller,
            buyer: None,
            state: PurchaseState::Created,
            settlement_rule,
            seller_refunded: false,
            created_at: Timestamp::now(),
            transitions: Vec::new(),
        })
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Seller withdraws the offer (CREATED → INACTIVE).
    ///
    /// Pays the entire custodied balance back to the seller.
    pub fn abort(&mut self, ctx: &CallContext) -> Result<TransitionOutcome, EscrowError> {
        let op = Operation::Abort;
        self.authorize(op, &ctx.caller)?;
        self.require_state(op)?;
        self.require_unattached(op, ctx.attached)?;

        let payout = Payout {
            recipient: self.seller.clone(),
            amount: ctx.custody,
        };
        Ok(self.commit(op, ctx, Some(payout)))
    }

    /// Any caller becomes the buyer by matching the collateral
    /// (CREATED → LOCKED).
    ///
    /// The attached amount must be exactly `2 * value`.
    pub fn confirm_purchase(&mut self, ctx: &CallContext) -> Result<TransitionOutcome, EscrowError> {
        let op = Operation::ConfirmPurchase;
        self.authorize(op, &ctx.caller)?;
        self.require_state(op)?;
        let required = self.collateral()?;
        if ctx.attached != required {
            return Err(EscrowError::InvalidAmount {
                operation: op.as_str(),
                attached: ctx.attached.units(),
                reason: format!("expected exactly {required} (2 * value)"),
            });
        }

        self.buyer = Some(ctx.caller.clone());
        Ok(self.commit(op, ctx, None))
    }

    /// Buyer confirms delivery (LOCKED → RELEASE).
    ///
    /// Returns `value` to the buyer; the other `value` of their deposit
    /// pays for the item.
    pub fn confirm_received(&mut self, ctx: &CallContext) -> Result<TransitionOutcome, EscrowError> {
        let op = Operation::ConfirmReceived;
        self.authorize(op, &ctx.caller)?;
        self.require_state(op)?;
        self.require_unattached(op, ctx.attached)?;

        let payout = Payout {
            recipient: ctx.caller.clone(),
            amount: self.value,
        };
        Ok(self.commit(op, ctx, Some(payout)))
    }

    /// Seller collects `3 * value`: their own `2 * value` plus the price.
    ///
    /// Under [`SettlementRule::AsObserved`] this requires INACTIVE and the
    /// state is unchanged; under [`SettlementRule::ReleaseThenRefund`] it
    /// requires RELEASE and moves to INACTIVE. Either way it pays out at
    /// most once per instance.
    pub fn refund_seller(&mut self, ctx: &CallContext) -> Result<TransitionOutcome, EscrowError> {
        let op = Operation::RefundSeller;
        self.authorize(op, &ctx.caller)?;
        self.require_state(op)?;
        if self.seller_refunded {
            return Err(EscrowError::AlreadyRefunded {
                operation: op.as_str(),
                escrow_id: self.id.to_string(),
            });
        }
        self.require_unattached(op, ctx.attached)?;
        let amount = self.seller_payout()?;

        self.seller_refunded = true;
        let payout = Payout {
            recipient: self.seller.clone(),
            amount,
        };
        Ok(self.commit(op, ctx, Some(payout)))
    }

    /// Dispatch `op` to its transition method.
    pub fn apply(
        &mut self,
        op: Operation,
        ctx: &CallContext,
    ) -> Result<TransitionOutcome, EscrowError> {
        match op {
            Operation::Abort => self.abort(ctx),
            Operation::ConfirmPurchase => self.confirm_purchase(ctx),
            Operation::ConfirmReceived => self.confirm_received(ctx),
            Operation::RefundSeller => self.refund_seller(ctx),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Instance identifier.
    pub fn id(&self) -> EscrowId {
        self.id
    }

    /// Item value (half the seller's deposit).
    pub fn value(&self) -> Amount {
        self.value
    }

    /// The seller.
    pub fn seller(&self) -> &Principal {
        &self.seller
    }

    /// The buyer, once a purchase has been confirmed.
    pub fn buyer(&self) -> Option<&Principal> {
        self.buyer.as_ref()
    }

    /// Current state.
    pub fn state(&self) -> PurchaseState {
        self.state
    }

    /// Where the seller's refund is permitted.
    pub fn settlement_rule(&self) -> SettlementRule {
        self.settlement_rule
    }

    /// Whether the seller's final payout has been made.
    pub fn seller_refunded(&self) -> bool {
        self.seller_refunded
    }

    /// When the instance was created.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Ordered log of accepted transitions.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Whether no further transition can change the state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal(self.settlement_rule)
    }

    /// Collateral each party posts: `2 * value`.
    pub fn collateral(&self) -> Result<Amount, EscrowError> {
        Ok(self.value.checked_mul(2)?)
    }

    /// The seller's final payout: `3 * value`.
    pub fn seller_payout(&self) -> Result<Amount, EscrowError> {
        Ok(self.value.checked_mul(3)?)
    }

    // ── Guards ───────────────────────────────────────────────────────

    fn authorize(&self, op: Operation, caller: &Principal) -> Result<(), EscrowError> {
        let required = op.required_role();
        let allowed = match required {
            Role::Any => true,
            Role::Seller => *caller == self.seller,
            Role::Buyer => self.buyer.as_ref() == Some(caller),
        };
        if allowed {
            Ok(())
        } else {
            Err(EscrowError::Unauthorized {
                operation: op.as_str(),
                caller: caller.to_string(),
                required,
            })
        }
    }

    fn require_state(&self, op: Operation) -> Result<(), EscrowError> {
        let expected = op.required_state(self.settlement_rule);
        if self.state != expected {
            return Err(EscrowError::InvalidState {
                operation: op.as_str(),
                state: self.state,
                expected,
            });
        }
        Ok(())
    }

    fn require_unattached(&self, op: Operation, attached: Amount) -> Result<(), EscrowError> {
        if !attached.is_zero() {
            return Err(EscrowError::InvalidAmount {
                operation: op.as_str(),
                attached: attached.units(),
                reason: "operation does not accept an attached amount".to_string(),
            });
        }
        Ok(())
    }

    /// Record the transition and move to the operation's target state.
    fn commit(
        &mut self,
        op: Operation,
        ctx: &CallContext,
        payout: Option<Payout>,
    ) -> TransitionOutcome {
        let from = self.state;
        let to = op.target_state();
        self.transitions.push(TransitionRecord {
            operation: op,
            actor: ctx.caller.clone(),
            from_state: from,
            to_state: to,
            attached: ctx.attached,
            timestamp: Timestamp::now(),
        });
        self.state = to;
        TransitionOutcome {
            operation: op,
            from,
            to,
            event: op.event(),
            payout,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn principal(name: &str) -> Principal {
        Principal::new(name).unwrap()
    }

    fn seller() -> Principal {
        principal("seller")
    }

    fn buyer() -> Principal {
        principal("buyer")
    }

    fn call(caller: Principal, attached: u64, custody: u64) -> CallContext {
        CallContext::new(caller, Amount::new(attached), Amount::new(custody))
    }

    fn created(rule: SettlementRule) -> PurchaseEscrow {
        PurchaseEscrow::create(seller(), Amount::new(10), rule).unwrap()
    }

    fn locked(rule: SettlementRule) -> PurchaseEscrow {
        let mut escrow = created(rule);
        escrow.confirm_purchase(&call(buyer(), 10, 10)).unwrap();
        escrow
    }

    fn released(rule: SettlementRule) -> PurchaseEscrow {
        let mut escrow = locked(rule);
        escrow.confirm_received(&call(buyer(), 0, 20)).unwrap();
        escrow
    }

    // ── Construction ─────────────────────────────────────────────────

    #[test]
    fn create_sets_value_and_seller() {
        let escrow = created(SettlementRule::AsObserved);
        assert_eq!(escrow.value(), Amount::new(5));
        assert_eq!(escrow.seller(), &seller());
        assert_eq!(escrow.buyer(), None);
        assert_eq!(escrow.state(), PurchaseState::Created);
        assert!(escrow.transitions().is_empty());
        assert!(!escrow.seller_refunded());
    }

    #[test]
    fn create_rejects_odd_deposit() {
        let err = PurchaseEscrow::create(seller(), Amount::new(11), SettlementRule::AsObserved)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidAmount);
    }

    #[test]
    fn create_rejects_zero_deposit() {
        let err = PurchaseEscrow::create(seller(), Amount::ZERO, SettlementRule::AsObserved)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidAmount);
    }

    #[test]
    fn create_rejects_deposit_whose_triple_overflows() {
        let err = PurchaseEscrow::create(
            seller(),
            Amount::new(u64::MAX - 1),
            SettlementRule::AsObserved,
        )
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidAmount);
    }

    #[test]
    fn collateral_and_payout() {
        let escrow = created(SettlementRule::AsObserved);
        assert_eq!(escrow.collateral().unwrap(), Amount::new(10));
        assert_eq!(escrow.seller_payout().unwrap(), Amount::new(15));
    }

    // ── Abort ────────────────────────────────────────────────────────

    #[test]
    fn abort_by_seller_returns_custody() {
        let mut escrow = created(SettlementRule::AsObserved);
        let outcome = escrow.abort(&call(seller(), 0, 10)).unwrap();
        assert_eq!(escrow.state(), PurchaseState::Inactive);
        assert_eq!(outcome.event, PurchaseEvent::Aborted);
        assert_eq!(
            outcome.payout,
            Some(Payout {
                recipient: seller(),
                amount: Amount::new(10)
            })
        );
    }

    #[test]
    fn abort_by_stranger_is_unauthorized() {
        let mut escrow = created(SettlementRule::AsObserved);
        let before = escrow.clone();
        let err = escrow.abort(&call(buyer(), 0, 10)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unauthorized);
        assert_eq!(escrow, before);
    }

    #[test]
    fn abort_after_lock_is_invalid_state() {
        let mut escrow = locked(SettlementRule::AsObserved);
        let err = escrow.abort(&call(seller(), 0, 20)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidState);
        assert_eq!(escrow.state(), PurchaseState::Locked);
    }

    #[test]
    fn abort_with_attached_amount_is_rejected() {
        let mut escrow = created(SettlementRule::AsObserved);
        let err = escrow.abort(&call(seller(), 1, 10)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidAmount);
        assert_eq!(escrow.state(), PurchaseState::Created);
    }

    #[test]
    fn abort_and_purchase_fail_after_abort() {
        let mut escrow = created(SettlementRule::AsObserved);
        escrow.abort(&call(seller(), 0, 10)).unwrap();
        assert_eq!(
            escrow.abort(&call(seller(), 0, 0)).unwrap_err().kind(),
            FailureKind::InvalidState
        );
        assert_eq!(
            escrow
                .confirm_purchase(&call(buyer(), 10, 0))
                .unwrap_err()
                .kind(),
            FailureKind::InvalidState
        );
    }

    // ── Confirm purchase ─────────────────────────────────────────────

    #[test]
    fn confirm_purchase_records_buyer_and_locks() {
        let mut escrow = created(SettlementRule::AsObserved);
        let outcome = escrow.confirm_purchase(&call(buyer(), 10, 10)).unwrap();
        assert_eq!(escrow.state(), PurchaseState::Locked);
        assert_eq!(escrow.buyer(), Some(&buyer()));
        assert_eq!(outcome.event, PurchaseEvent::PurchaseConfirmed);
        assert_eq!(outcome.payout, None);
    }

    #[test]
    fn confirm_purchase_by_seller_is_allowed() {
        let mut escrow = created(SettlementRule::AsObserved);
        escrow.confirm_purchase(&call(seller(), 10, 10)).unwrap();
        assert_eq!(escrow.buyer(), Some(&seller()));
    }

    #[test]
    fn confirm_purchase_rejects_short_and_excess_deposits() {
        for attached in [0, 5, 9, 11, 20] {
            let mut escrow = created(SettlementRule::AsObserved);
            let err = escrow
                .confirm_purchase(&call(buyer(), attached, 10))
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::InvalidAmount, "attached {attached}");
            assert_eq!(escrow.state(), PurchaseState::Created);
            assert_eq!(escrow.buyer(), None);
        }
    }

    #[test]
    fn second_confirm_purchase_is_invalid_state() {
        let mut escrow = locked(SettlementRule::AsObserved);
        let err = escrow
            .confirm_purchase(&call(principal("late-buyer"), 10, 20))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidState);
        assert_eq!(escrow.buyer(), Some(&buyer()));
    }

    // ── Confirm received ─────────────────────────────────────────────

    #[test]
    fn confirm_received_pays_value_to_buyer() {
        let mut escrow = locked(SettlementRule::AsObserved);
        let outcome = escrow.confirm_received(&call(buyer(), 0, 20)).unwrap();
        assert_eq!(escrow.state(), PurchaseState::Release);
        assert_eq!(outcome.event, PurchaseEvent::ItemReceived);
        assert_eq!(
            outcome.payout,
            Some(Payout {
                recipient: buyer(),
                amount: Amount::new(5)
            })
        );
    }

    #[test]
    fn confirm_received_by_seller_is_unauthorized() {
        let mut escrow = locked(SettlementRule::AsObserved);
        let err = escrow.confirm_received(&call(seller(), 0, 20)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unauthorized);
        assert_eq!(escrow.state(), PurchaseState::Locked);
    }

    #[test]
    fn confirm_received_before_purchase_is_unauthorized() {
        // No buyer recorded yet, so the role check fails first.
        let mut escrow = created(SettlementRule::AsObserved);
        let err = escrow.confirm_received(&call(buyer(), 0, 10)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unauthorized);
    }

    #[test]
    fn confirm_received_twice_is_invalid_state() {
        let mut escrow = released(SettlementRule::AsObserved);
        let err = escrow.confirm_received(&call(buyer(), 0, 15)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidState);
    }

    // ── Refund seller ────────────────────────────────────────────────

    #[test]
    fn observed_refund_is_unreachable_after_release() {
        let mut escrow = released(SettlementRule::AsObserved);
        let err = escrow.refund_seller(&call(seller(), 0, 15)).unwrap_err();
        assert_eq!(
            err,
            EscrowError::InvalidState {
                operation: "refund_seller",
                state: PurchaseState::Release,
                expected: PurchaseState::Inactive,
            }
        );
        assert!(escrow.is_terminal());
    }

    #[test]
    fn observed_refund_from_inactive_pays_three_times_value_once() {
        let mut escrow = created(SettlementRule::AsObserved);
        escrow.abort(&call(seller(), 0, 10)).unwrap();
        let outcome = escrow.refund_seller(&call(seller(), 0, 0)).unwrap();
        assert_eq!(escrow.state(), PurchaseState::Inactive);
        assert_eq!(outcome.from, PurchaseState::Inactive);
        assert_eq!(outcome.to, PurchaseState::Inactive);
        assert_eq!(outcome.event, PurchaseEvent::SellerRefunded);
        assert_eq!(outcome.payout.map(|p| p.amount), Some(Amount::new(15)));
        assert!(escrow.seller_refunded());

        let err = escrow.refund_seller(&call(seller(), 0, 0)).unwrap_err();
        assert!(matches!(err, EscrowError::AlreadyRefunded { .. }));
    }

    #[test]
    fn release_then_refund_completes_happy_path() {
        let mut escrow = released(SettlementRule::ReleaseThenRefund);
        let outcome = escrow.refund_seller(&call(seller(), 0, 15)).unwrap();
        assert_eq!(escrow.state(), PurchaseState::Inactive);
        assert_eq!(
            outcome.payout,
            Some(Payout {
                recipient: seller(),
                amount: Amount::new(15)
            })
        );
        assert!(escrow.is_terminal());
        assert_eq!(
            escrow.refund_seller(&call(seller(), 0, 0)).unwrap_err().kind(),
            FailureKind::InvalidState
        );
    }

    #[test]
    fn release_then_refund_rejects_refund_after_abort() {
        let mut escrow = created(SettlementRule::ReleaseThenRefund);
        escrow.abort(&call(seller(), 0, 10)).unwrap();
        let err = escrow.refund_seller(&call(seller(), 0, 0)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidState);
    }

    #[test]
    fn refund_by_buyer_is_unauthorized() {
        let mut escrow = released(SettlementRule::ReleaseThenRefund);
        let err = escrow.refund_seller(&call(buyer(), 0, 15)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unauthorized);
        assert!(!escrow.seller_refunded());
    }

    #[test]
    fn refund_with_attached_amount_is_rejected() {
        let mut escrow = released(SettlementRule::ReleaseThenRefund);
        let before = escrow.clone();
        let err = escrow.refund_seller(&call(seller(), 3, 15)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidAmount);
        assert_eq!(escrow, before);
    }

    // ── History, dispatch, serialization ─────────────────────────────

    #[test]
    fn transition_history_tracks_operations() {
        let mut escrow = released(SettlementRule::ReleaseThenRefund);
        escrow.refund_seller(&call(seller(), 0, 15)).unwrap();
        let ops: Vec<_> = escrow.transitions().iter().map(|r| r.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::ConfirmPurchase,
                Operation::ConfirmReceived,
                Operation::RefundSeller
            ]
        );
        assert_eq!(escrow.transitions()[0].attached, Amount::new(10));
        assert_eq!(escrow.transitions()[0].actor, buyer());
    }

    #[test]
    fn apply_dispatches_by_operation() {
        let mut escrow = created(SettlementRule::AsObserved);
        let outcome = escrow
            .apply(Operation::ConfirmPurchase, &call(buyer(), 10, 10))
            .unwrap();
        assert_eq!(outcome.operation, Operation::ConfirmPurchase);
        assert_eq!(escrow.state(), PurchaseState::Locked);
    }

    #[test]
    fn escrow_serialization_roundtrip() {
        let escrow = locked(SettlementRule::ReleaseThenRefund);
        let json = serde_json::to_string(&escrow).unwrap();
        let parsed: PurchaseEscrow = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, escrow);
    }
}
