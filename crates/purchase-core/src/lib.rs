#![deny(missing_docs)]

//! # purchase-core — Foundational Types for the Safe Remote Purchase
//!
//! This crate defines the primitives that every other crate in the workspace
//! depends on. It has no internal crate dependencies, only `serde`,
//! `thiserror`, `chrono`, and `uuid` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** A [`Principal`] is not a
//!    `String` and an [`Amount`] is not a bare `u64`. You cannot pass an
//!    [`EscrowId`] where a principal is expected.
//!
//! 2. **Checked arithmetic only.** [`Amount`] exposes no operator overloads;
//!    every sum, difference, and multiple goes through a `checked_*` method
//!    that reports overflow as a [`ValidationError`].
//!
//! 3. **UTC-only time.** Transition records and receipts carry a
//!    [`Timestamp`] with a `Z` suffix in serialized form.

pub mod amount;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use amount::Amount;
pub use error::ValidationError;
pub use identity::{EscrowId, Principal};
pub use temporal::Timestamp;
