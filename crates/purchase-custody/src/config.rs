//! # Host Configuration

use serde::{Deserialize, Serialize};

use purchase_state::SettlementRule;

/// Settings applied to every escrow a host deploys.
///
/// Missing fields deserialize to their defaults, so an empty YAML mapping
/// is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Where the seller's final refund is permitted.
    pub settlement_rule: SettlementRule,
}

impl HostConfig {
    /// Configuration with the given settlement rule.
    pub fn with_rule(settlement_rule: SettlementRule) -> Self {
        Self { settlement_rule }
    }
}
