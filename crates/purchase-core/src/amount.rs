//! # Monetary Amounts
//!
//! Amounts are unsigned integers in the smallest coin unit. There is no
//! rounding anywhere in the escrow: an odd deposit cannot be halved, and
//! every multiple of the item value is computed with overflow checks.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A non-negative amount in the smallest coin unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw coin-unit count.
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// The raw coin-unit count.
    pub const fn units(self) -> u64 {
        self.0
    }

    /// Whether the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whether the amount splits into two equal whole halves.
    pub const fn is_even(self) -> bool {
        self.0 % 2 == 0
    }

    /// Exact half of the amount, or `None` if it is odd.
    pub const fn exact_half(self) -> Option<Amount> {
        if self.is_even() {
            Some(Amount(self.0 / 2))
        } else {
            None
        }
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the sum exceeds `u64::MAX`.
    pub fn checked_add(self, rhs: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or(ValidationError::AmountOverflow {
                lhs: self.0,
                op: "+",
                rhs: rhs.0,
            })
    }

    /// Checked subtraction.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if `rhs` exceeds `self`.
    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_sub(rhs.0)
            .map(Amount)
            .ok_or(ValidationError::AmountOverflow {
                lhs: self.0,
                op: "-",
                rhs: rhs.0,
            })
    }

    /// Checked multiplication by a whole factor.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the product exceeds `u64::MAX`.
    pub fn checked_mul(self, factor: u64) -> Result<Amount, ValidationError> {
        self.0
            .checked_mul(factor)
            .map(Amount)
            .ok_or(ValidationError::AmountOverflow {
                lhs: self.0,
                op: "*",
                rhs: factor,
            })
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
