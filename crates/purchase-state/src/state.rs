//! # Purchase States and Settlement Rules

use serde::{Deserialize, Serialize};

/// The lifecycle state of an escrow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseState {
    /// Seller has deposited `2 * value`; waiting for a buyer.
    Created,
    /// Buyer has matched the collateral; item is in transit.
    Locked,
    /// Buyer confirmed receipt and got `value` back.
    Release,
    /// Instance is closed to new purchases.
    Inactive,
}

impl PurchaseState {
    /// All states in declaration order.
    pub const ALL: [PurchaseState; 4] = [
        Self::Created,
        Self::Locked,
        Self::Release,
        Self::Inactive,
    ];

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Locked => "LOCKED",
            Self::Release => "RELEASE",
            Self::Inactive => "INACTIVE",
        }
    }

    /// States reachable in one step under `rule`.
    ///
    /// Self-loops are included where an operation leaves the state unchanged.
    pub fn valid_transitions(&self, rule: SettlementRule) -> &'static [PurchaseState] {
        match (self, rule) {
            (Self::Created, _) => &[Self::Locked, Self::Inactive],
            (Self::Locked, _) => &[Self::Release],
            (Self::Release, SettlementRule::AsObserved) => &[],
            (Self::Release, SettlementRule::ReleaseThenRefund) => &[Self::Inactive],
            (Self::Inactive, SettlementRule::AsObserved) => &[Self::Inactive],
            (Self::Inactive, SettlementRule::ReleaseThenRefund) => &[],
        }
    }

    /// Whether no transition leads anywhere else from this state.
    pub fn is_terminal(&self, rule: SettlementRule) -> bool {
        self.valid_transitions(rule).iter().all(|next| next == self)
    }
}

impl std::fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the seller's final `3 * value` refund is permitted.
///
/// The observed design gates `refund_seller` on `Inactive`, which the happy
/// path never reaches: `confirm_received` stops at `Release`. `AsObserved`
/// keeps that behavior; `ReleaseThenRefund` gates the refund on `Release`
/// and closes the instance afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementRule {
    /// `refund_seller` requires `Inactive` and leaves the state unchanged.
    #[default]
    AsObserved,
    /// `refund_seller` requires `Release` and moves to `Inactive`.
    ReleaseThenRefund,
}

impl SettlementRule {
    /// The canonical string name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AsObserved => "as_observed",
            Self::ReleaseThenRefund => "release_then_refund",
        }
    }

    /// State `refund_seller` must be called from.
    pub fn refund_state(&self) -> PurchaseState {
        match self {
            Self::AsObserved => PurchaseState::Inactive,
            Self::ReleaseThenRefund => PurchaseState::Release,
        }
    }
}

impl std::fmt::Display for SettlementRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettlementRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "as_observed" => Ok(Self::AsObserved),
            "release_then_refund" => Ok(Self::ReleaseThenRefund),
            other => Err(format!(
                "unknown settlement rule \"{other}\" (expected as_observed or release_then_refund)"
            )),
        }
    }
}
