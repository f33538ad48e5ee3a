//! # Operations, Roles, and Notifications
//!
//! Each [`Operation`] declares the capability it needs ([`Role`]), whether it
//! accepts an attached deposit, the state it must be called from, and the
//! state it leaves behind. The escrow checks these declarations before it
//! mutates anything.

use serde::{Deserialize, Serialize};

use purchase_core::{Amount, Principal};

use crate::state::{PurchaseState, SettlementRule};

/// The capability an operation requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Only the recorded seller.
    Seller,
    /// Only the recorded buyer.
    Buyer,
    /// Any principal.
    Any,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Seller => "seller",
            Self::Buyer => "buyer",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

/// The four operations callable on a live escrow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Seller reclaims the deposit before anyone buys.
    Abort,
    /// A buyer locks the purchase by matching the collateral.
    ConfirmPurchase,
    /// The buyer confirms delivery and recovers their surplus collateral.
    ConfirmReceived,
    /// The seller collects price plus collateral.
    RefundSeller,
}

impl Operation {
    /// All operations in declaration order.
    pub const ALL: [Operation; 4] = [
        Self::Abort,
        Self::ConfirmPurchase,
        Self::ConfirmReceived,
        Self::RefundSeller,
    ];

    /// The canonical string name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::ConfirmPurchase => "confirm_purchase",
            Self::ConfirmReceived => "confirm_received",
            Self::RefundSeller => "refund_seller",
        }
    }

    /// The role a caller must hold.
    pub fn required_role(&self) -> Role {
        match self {
            Self::Abort | Self::RefundSeller => Role::Seller,
            Self::ConfirmPurchase => Role::Any,
            Self::ConfirmReceived => Role::Buyer,
        }
    }

    /// Whether the operation accepts a non-zero attached amount.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::ConfirmPurchase)
    }

    /// The state the instance must be in.
    pub fn required_state(&self, rule: SettlementRule) -> PurchaseState {
        match self {
            Self::Abort | Self::ConfirmPurchase => PurchaseState::Created,
            Self::ConfirmReceived => PurchaseState::Locked,
            Self::RefundSeller => rule.refund_state(),
        }
    }

    /// The state the instance is left in on success.
    pub fn target_state(&self) -> PurchaseState {
        match self {
            Self::Abort | Self::RefundSeller => PurchaseState::Inactive,
            Self::ConfirmPurchase => PurchaseState::Locked,
            Self::ConfirmReceived => PurchaseState::Release,
        }
    }

    /// The notification emitted on success.
    pub fn event(&self) -> PurchaseEvent {
        match self {
            Self::Abort => PurchaseEvent::Aborted,
            Self::ConfirmPurchase => PurchaseEvent::PurchaseConfirmed,
            Self::ConfirmReceived => PurchaseEvent::ItemReceived,
            Self::RefundSeller => PurchaseEvent::SellerRefunded,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget notification emitted by a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseEvent {
    /// The seller aborted before a purchase.
    Aborted,
    /// A buyer locked the purchase.
    PurchaseConfirmed,
    /// The buyer confirmed delivery.
    ItemReceived,
    /// The seller collected the final payout.
    SellerRefunded,
}

impl std::fmt::Display for PurchaseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Aborted => "Aborted",
            Self::PurchaseConfirmed => "PurchaseConfirmed",
            Self::ItemReceived => "ItemReceived",
            Self::SellerRefunded => "SellerRefunded",
        };
        f.write_str(s)
    }
}

/// A transfer out of custody that a transition mandates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Who receives the funds.
    pub recipient: Principal,
    /// How much leaves custody.
    pub amount: Amount,
}
