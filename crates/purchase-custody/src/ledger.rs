//! # Custody Ledger
//!
//! Two kinds of account: principal wallets and per-escrow custody. Funds
//! only move between them through [`Ledger::settle`], which computes every
//! resulting balance with checked arithmetic before it writes any of them.
//! The sum of all balances is therefore unchanged by every settlement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use purchase_core::{Amount, EscrowId, Principal};
use purchase_state::Payout;

use crate::error::HostError;

/// The value movements of one hosted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Escrow whose custody is credited and debited.
    pub escrow: EscrowId,
    /// Principal whose wallet pays the deposit.
    pub depositor: Principal,
    /// Amount moved from the depositor into custody.
    pub deposit: Amount,
    /// Amount moved from custody to a recipient afterwards.
    pub payout: Option<Payout>,
}

/// Balances resulting from a settlement, not yet written.
struct Postings {
    depositor: Option<(Principal, Amount)>,
    custody: (EscrowId, Amount),
    recipient: Option<(Principal, Amount)>,
}

/// Wallet and custody balances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    wallets: BTreeMap<Principal, Amount>,
    custody: BTreeMap<EscrowId, Amount>,
}

impl Ledger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a wallet from outside the system. Returns the new balance.
    pub fn fund(&mut self, principal: &Principal, amount: Amount) -> Result<Amount, HostError> {
        let balance = self.balance_of(principal).checked_add(amount)?;
        self.wallets.insert(principal.clone(), balance);
        Ok(balance)
    }

    /// Wallet balance; zero for an unknown principal.
    pub fn balance_of(&self, principal: &Principal) -> Amount {
        self.wallets.get(principal).copied().unwrap_or_default()
    }

    /// Custodied balance; zero for an unknown escrow.
    pub fn custody_of(&self, escrow: &EscrowId) -> Amount {
        self.custody.get(escrow).copied().unwrap_or_default()
    }

    /// All wallet balances, ordered by principal.
    pub fn wallets(&self) -> &BTreeMap<Principal, Amount> {
        &self.wallets
    }

    /// All custody balances, ordered by escrow identifier.
    pub fn custody_accounts(&self) -> &BTreeMap<EscrowId, Amount> {
        &self.custody
    }

    /// Sum of every wallet and custody balance.
    pub fn total_supply(&self) -> Result<Amount, HostError> {
        self.wallets
            .values()
            .chain(self.custody.values())
            .try_fold(Amount::ZERO, |acc, v| acc.checked_add(*v).map_err(HostError::from))
    }

    /// Validate a settlement without applying it.
    pub fn check(&self, settlement: &Settlement) -> Result<(), HostError> {
        self.plan(settlement).map(|_| ())
    }

    /// Apply a settlement, or change nothing.
    pub fn settle(&mut self, settlement: &Settlement) -> Result<(), HostError> {
        let postings = self.plan(settlement)?;
        if let Some((principal, balance)) = postings.depositor {
            self.wallets.insert(principal, balance);
        }
        let (escrow, held) = postings.custody;
        self.custody.insert(escrow, held);
        if let Some((principal, balance)) = postings.recipient {
            self.wallets.insert(principal, balance);
        }
        Ok(())
    }

    fn plan(&self, settlement: &Settlement) -> Result<Postings, HostError> {
        let available = self.balance_of(&settlement.depositor);
        if available < settlement.deposit {
            return Err(HostError::InsufficientFunds {
                principal: settlement.depositor.to_string(),
                required: settlement.deposit.units(),
                available: available.units(),
            });
        }
        let depositor_after = available.checked_sub(settlement.deposit)?;
        let mut held = self
            .custody_of(&settlement.escrow)
            .checked_add(settlement.deposit)?;

        let recipient = match &settlement.payout {
            None => None,
            Some(payout) => {
                if held < payout.amount {
                    return Err(HostError::InsufficientCustody {
                        escrow_id: settlement.escrow.to_string(),
                        required: payout.amount.units(),
                        available: held.units(),
                    });
                }
                held = held.checked_sub(payout.amount)?;
                // The recipient may be the depositor, whose balance has
                // already been debited above.
                let before = if payout.recipient == settlement.depositor {
                    depositor_after
                } else {
                    self.balance_of(&payout.recipient)
                };
                Some((payout.recipient.clone(), before.checked_add(payout.amount)?))
            }
        };

        let depositor = if settlement.deposit.is_zero() {
            None
        } else {
            Some((settlement.depositor.clone(), depositor_after))
        };

        Ok(Postings {
            depositor,
            custody: (settlement.escrow, held),
            recipient,
        })
    }
}
