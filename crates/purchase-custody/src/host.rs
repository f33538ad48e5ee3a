//! # Escrow Host
//!
//! Registry and execution environment for escrow instances.
//!
//! ## Call Protocol
//!
//! 1. Enter the instance's guard. Calls from other threads wait; a call
//!    made from inside a running call on the same instance (through a
//!    transfer hook) fails with [`HostError::Reentrant`].
//! 2. Snapshot the instance and apply the transition. The state machine
//!    writes its new state before any funds move.
//! 3. Check the settlement against the ledger, offer the payout to the
//!    [`Recipient`], then settle.
//! 4. If step 3 fails, restore the snapshot. Nothing is published.
//! 5. Otherwise publish the notice and return a [`Receipt`].
//!
//! The ledger lock is never held while a hook runs, so a hook may call
//! into other instances. A thread that already holds one instance guard
//! never waits for another: if the other instance is busy on a different
//! thread the nested call fails with [`HostError::Busy`]. Two hooks calling
//! into each other's instances therefore cannot deadlock.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde::{Deserialize, Serialize};

use purchase_core::{Amount, EscrowId, Principal, Timestamp};
use purchase_state::{
    CallContext, Operation, Payout, PurchaseEscrow, PurchaseEvent, PurchaseState,
    TransitionOutcome,
};

use crate::config::HostConfig;
use crate::error::HostError;
use crate::ledger::{Ledger, Settlement};
use crate::notify::{EventSink, Notice, TracingSink};
use crate::transfer::{AcceptAll, Recipient};

type Slot = Arc<ReentrantMutex<RefCell<PurchaseEscrow>>>;

thread_local! {
    /// Instance guards held by the current thread.
    static GUARDS_HELD: Cell<usize> = const { Cell::new(0) };
}

/// A held instance guard.
struct InstanceGuard<'a> {
    inner: ReentrantMutexGuard<'a, RefCell<PurchaseEscrow>>,
}

impl<'a> InstanceGuard<'a> {
    /// Block for the guard, unless this thread already holds one.
    fn enter(slot: &'a Slot, id: EscrowId, operation: &'static str) -> Result<Self, HostError> {
        let nested = GUARDS_HELD.with(|held| held.get() > 0);
        let inner = if nested {
            slot.try_lock().ok_or_else(|| HostError::Busy {
                escrow_id: id.to_string(),
                operation,
            })?
        } else {
            slot.lock()
        };
        GUARDS_HELD.with(|held| held.set(held.get() + 1));
        Ok(Self { inner })
    }
}

impl Deref for InstanceGuard<'_> {
    type Target = RefCell<PurchaseEscrow>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        GUARDS_HELD.with(|held| held.set(held.get().saturating_sub(1)));
    }
}

/// Proof of a committed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The escrow called.
    pub escrow_id: EscrowId,
    /// The operation applied.
    pub operation: Operation,
    /// Who called.
    pub caller: Principal,
    /// Amount the caller attached.
    pub attached: Amount,
    /// State before.
    pub from: PurchaseState,
    /// State after.
    pub to: PurchaseState,
    /// Notification published.
    pub event: PurchaseEvent,
    /// Funds that left custody.
    pub payout: Option<Payout>,
    /// When the call committed.
    pub timestamp: Timestamp,
}

impl Receipt {
    fn new(escrow_id: EscrowId, ctx: &CallContext, outcome: TransitionOutcome) -> Self {
        Self {
            escrow_id,
            operation: outcome.operation,
            caller: ctx.caller.clone(),
            attached: ctx.attached,
            from: outcome.from,
            to: outcome.to,
            event: outcome.event,
            payout: outcome.payout,
            timestamp: Timestamp::now(),
        }
    }

    /// The notice observers receive for this call.
    pub fn notice(&self) -> Notice {
        Notice {
            escrow_id: self.escrow_id,
            event: self.event,
            state: self.to,
            timestamp: self.timestamp,
        }
    }
}

/// Hosts escrow instances and the balances they move.
pub struct EscrowHost {
    config: HostConfig,
    instances: RwLock<HashMap<EscrowId, Slot>>,
    ledger: Mutex<Ledger>,
    recipient: Box<dyn Recipient>,
    sink: Box<dyn EventSink>,
}

impl EscrowHost {
    /// A host that accepts every transfer and logs notices through `tracing`.
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            instances: RwLock::new(HashMap::new()),
            ledger: Mutex::new(Ledger::new()),
            recipient: Box::new(AcceptAll),
            sink: Box::new(TracingSink),
        }
    }

    /// Replace the transfer hook.
    pub fn with_recipient(mut self, recipient: impl Recipient + 'static) -> Self {
        self.recipient = Box::new(recipient);
        self
    }

    /// Replace the notification sink.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// The host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ── Ledger access ────────────────────────────────────────────────

    /// Credit a wallet from outside the system. Returns the new balance.
    pub fn fund(&self, principal: &Principal, amount: Amount) -> Result<Amount, HostError> {
        self.ledger.lock().fund(principal, amount)
    }

    /// Wallet balance of `principal`.
    pub fn balance_of(&self, principal: &Principal) -> Amount {
        self.ledger.lock().balance_of(principal)
    }

    /// Custodied balance of escrow `id`.
    pub fn custody_of(&self, id: EscrowId) -> Amount {
        self.ledger.lock().custody_of(&id)
    }

    /// Copy of the full ledger.
    pub fn ledger(&self) -> Ledger {
        self.ledger.lock().clone()
    }

    // ── Instances ────────────────────────────────────────────────────

    /// Open a new escrow funded by `seller`'s `deposit`.
    ///
    /// # Errors
    ///
    /// [`HostError::Escrow`] if the deposit is invalid,
    /// [`HostError::InsufficientFunds`] if the seller cannot pay it.
    pub fn deploy(&self, seller: &Principal, deposit: Amount) -> Result<EscrowId, HostError> {
        let escrow = PurchaseEscrow::create(seller.clone(), deposit, self.config.settlement_rule)?;
        let id = escrow.id();
        self.ledger.lock().settle(&Settlement {
            escrow: id,
            depositor: seller.clone(),
            deposit,
            payout: None,
        })?;
        tracing::debug!(
            escrow_id = %id,
            seller = %seller,
            value = %escrow.value(),
            rule = %self.config.settlement_rule,
            "escrow deployed"
        );
        self.instances
            .write()
            .insert(id, Arc::new(ReentrantMutex::new(RefCell::new(escrow))));
        Ok(id)
    }

    /// Copy of the current instance state.
    ///
    /// Fails with [`HostError::Reentrant`] when called from inside a
    /// running call on the same instance, and with [`HostError::Busy`] when
    /// called from a hook while another thread is running the instance.
    pub fn escrow(&self, id: EscrowId) -> Result<PurchaseEscrow, HostError> {
        let slot = self.slot(id)?;
        let guard = InstanceGuard::enter(&slot, id, "inspect")?;
        let escrow = guard.try_borrow().map_err(|_| HostError::Reentrant {
            escrow_id: id.to_string(),
            operation: "inspect",
        })?;
        Ok(escrow.clone())
    }

    /// Identifiers of all hosted escrows, in sorted order.
    pub fn escrow_ids(&self) -> Vec<EscrowId> {
        let mut ids: Vec<_> = self.instances.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Run `op` on escrow `id` on behalf of `caller`, attaching `attached`.
    ///
    /// Either every effect of the call happens or none does.
    pub fn call(
        &self,
        id: EscrowId,
        caller: &Principal,
        attached: Amount,
        op: Operation,
    ) -> Result<Receipt, HostError> {
        let slot = self.slot(id)?;
        let guard = InstanceGuard::enter(&slot, id, op.as_str())?;
        let mut escrow = guard.try_borrow_mut().map_err(|_| HostError::Reentrant {
            escrow_id: id.to_string(),
            operation: op.as_str(),
        })?;

        // Deposit arithmetic belongs to the ledger, after the guards.
        let ctx = CallContext::new(caller.clone(), attached, self.custody_of(id));
        let snapshot = escrow.clone();
        let outcome = escrow.apply(op, &ctx)?;

        let settlement = Settlement {
            escrow: id,
            depositor: caller.clone(),
            deposit: attached,
            payout: outcome.payout.clone(),
        };
        if let Err(e) = self.transfer(&settlement) {
            *escrow = snapshot;
            tracing::warn!(
                escrow_id = %id,
                operation = %op,
                caller = %caller,
                error = %e,
                "call rolled back"
            );
            return Err(e);
        }
        drop(escrow);

        tracing::debug!(
            escrow_id = %id,
            operation = %op,
            caller = %caller,
            from = %outcome.from,
            to = %outcome.to,
            "transition committed"
        );
        let receipt = Receipt::new(id, &ctx, outcome);
        self.sink.publish(&receipt.notice());
        Ok(receipt)
    }

    /// Seller aborts before a purchase.
    pub fn abort(&self, id: EscrowId, caller: &Principal) -> Result<Receipt, HostError> {
        self.call(id, caller, Amount::ZERO, Operation::Abort)
    }

    /// Caller buys, attaching the collateral.
    pub fn confirm_purchase(
        &self,
        id: EscrowId,
        caller: &Principal,
        attached: Amount,
    ) -> Result<Receipt, HostError> {
        self.call(id, caller, attached, Operation::ConfirmPurchase)
    }

    /// Buyer confirms delivery.
    pub fn confirm_received(&self, id: EscrowId, caller: &Principal) -> Result<Receipt, HostError> {
        self.call(id, caller, Amount::ZERO, Operation::ConfirmReceived)
    }

    /// Seller collects the final payout.
    pub fn refund_seller(&self, id: EscrowId, caller: &Principal) -> Result<Receipt, HostError> {
        self.call(id, caller, Amount::ZERO, Operation::RefundSeller)
    }

    fn slot(&self, id: EscrowId) -> Result<Slot, HostError> {
        self.instances
            .read()
            .get(&id)
            .cloned()
            .ok_or(HostError::UnknownEscrow(id))
    }

    /// Move the funds of one call. The ledger lock is released while the
    /// recipient hook runs.
    fn transfer(&self, settlement: &Settlement) -> Result<(), HostError> {
        self.ledger.lock().check(settlement)?;
        if let Some(payout) = &settlement.payout {
            self.recipient
                .accept(settlement.escrow, payout)
                .map_err(|reason| HostError::TransferRejected {
                    escrow_id: settlement.escrow.to_string(),
                    recipient: payout.recipient.to_string(),
                    amount: payout.amount.units(),
                    reason,
                })?;
        }
        self.ledger.lock().settle(settlement)
    }
}

impl std::fmt::Debug for EscrowHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowHost")
            .field("config", &self.config)
            .field("instances", &self.instances.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemorySink;
    use purchase_state::{FailureKind, SettlementRule};

    fn principal(name: &str) -> Principal {
        Principal::new(name).unwrap()
    }

    fn host_with(rule: SettlementRule) -> (EscrowHost, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let host = EscrowHost::new(HostConfig::with_rule(rule)).with_sink(Arc::clone(&sink));
        host.fund(&principal("seller"), Amount::new(100)).unwrap();
        host.fund(&principal("buyer"), Amount::new(100)).unwrap();
        (host, sink)
    }

    #[test]
    fn deploy_moves_deposit_into_custody() {
        let (host, _) = host_with(SettlementRule::AsObserved);
        let id = host.deploy(&principal("seller"), Amount::new(10)).unwrap();
        assert_eq!(host.custody_of(id), Amount::new(10));
        assert_eq!(host.balance_of(&principal("seller")), Amount::new(90));
        assert_eq!(host.escrow(id).unwrap().state(), PurchaseState::Created);
        assert_eq!(host.escrow_ids(), vec![id]);
    }

    #[test]
    fn deploy_with_odd_deposit_moves_nothing() {
        let (host, _) = host_with(SettlementRule::AsObserved);
        let err = host.deploy(&principal("seller"), Amount::new(9)).unwrap_err();
        assert_eq!(err.escrow_kind(), Some(FailureKind::InvalidAmount));
        assert_eq!(host.balance_of(&principal("seller")), Amount::new(100));
        assert!(host.escrow_ids().is_empty());
    }

    #[test]
    fn deploy_beyond_wallet_fails() {
        let (host, _) = host_with(SettlementRule::AsObserved);
        let err = host.deploy(&principal("seller"), Amount::new(200)).unwrap_err();
        assert!(matches!(err, HostError::InsufficientFunds { .. }));
        assert!(host.escrow_ids().is_empty());
    }

    #[test]
    fn unknown_escrow() {
        let (host, _) = host_with(SettlementRule::AsObserved);
        let id = EscrowId::new();
        assert_eq!(
            host.abort(id, &principal("seller")).unwrap_err(),
            HostError::UnknownEscrow(id)
        );
    }

    #[test]
    fn abort_returns_full_custody_and_publishes() {
        let (host, sink) = host_with(SettlementRule::AsObserved);
        let id = host.deploy(&principal("seller"), Amount::new(10)).unwrap();
        let receipt = host.abort(id, &principal("seller")).unwrap();
        assert_eq!(receipt.to, PurchaseState::Inactive);
        assert_eq!(host.balance_of(&principal("seller")), Amount::new(100));
        assert_eq!(host.custody_of(id), Amount::ZERO);
        assert_eq!(sink.events(), vec![PurchaseEvent::Aborted]);
    }

    #[test]
    fn purchase_without_funds_rolls_back() {
        let (host, sink) = host_with(SettlementRule::AsObserved);
        let id = host.deploy(&principal("seller"), Amount::new(10)).unwrap();
        let pauper = principal("pauper");
        let err = host.confirm_purchase(id, &pauper, Amount::new(10)).unwrap_err();
        assert!(matches!(err, HostError::InsufficientFunds { .. }));
        let escrow = host.escrow(id).unwrap();
        assert_eq!(escrow.state(), PurchaseState::Created);
        assert_eq!(escrow.buyer(), None);
        assert!(escrow.transitions().is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn rejected_payout_rolls_back_state_and_balances() {
        let sink = Arc::new(MemorySink::new());
        let host = EscrowHost::new(HostConfig::default())
            .with_sink(Arc::clone(&sink))
            .with_recipient(|_: EscrowId, p: &Payout| {
                if p.recipient.as_str() == "buyer" {
                    Err("buyer wallet cannot receive".to_string())
                } else {
                    Ok(())
                }
            });
        host.fund(&principal("seller"), Amount::new(10)).unwrap();
        host.fund(&principal("buyer"), Amount::new(10)).unwrap();
        let id = host.deploy(&principal("seller"), Amount::new(10)).unwrap();
        host.confirm_purchase(id, &principal("buyer"), Amount::new(10))
            .unwrap();
        let ledger_before = host.ledger();
        let escrow_before = host.escrow(id).unwrap();

        let err = host.confirm_received(id, &principal("buyer")).unwrap_err();
        assert!(matches!(err, HostError::TransferRejected { .. }));
        assert_eq!(host.ledger(), ledger_before);
        assert_eq!(host.escrow(id).unwrap(), escrow_before);
        assert_eq!(sink.events(), vec![PurchaseEvent::PurchaseConfirmed]);
    }

    #[test]
    fn receipt_carries_payout() {
        let (host, _) = host_with(SettlementRule::AsObserved);
        let id = host.deploy(&principal("seller"), Amount::new(10)).unwrap();
        host.confirm_purchase(id, &principal("buyer"), Amount::new(10))
            .unwrap();
        let receipt = host.confirm_received(id, &principal("buyer")).unwrap();
        assert_eq!(receipt.operation, Operation::ConfirmReceived);
        assert_eq!(receipt.from, PurchaseState::Locked);
        assert_eq!(receipt.to, PurchaseState::Release);
        assert_eq!(
            receipt.payout,
            Some(Payout {
                recipient: principal("buyer"),
                amount: Amount::new(5),
            })
        );
        assert_eq!(receipt.notice().event, PurchaseEvent::ItemReceived);
    }

    #[test]
    fn debug_does_not_expose_hooks() {
        let (host, _) = host_with(SettlementRule::AsObserved);
        let dbg = format!("{host:?}");
        assert!(dbg.starts_with("EscrowHost"));
    }
}
