//! # purchase-custody — Escrow Hosting Environment
//!
//! The state machine in `purchase-state` decides *what* moves; this crate
//! holds the money and makes each call all-or-nothing.
//!
//! - **Ledger** ([`ledger`]): wallet balances per principal and custodied
//!   balance per escrow. A [`Settlement`] (deposit in, optional payout out)
//!   is validated in full before any balance is written.
//!
//! - **Host** ([`host`]): the registry of independently addressable escrow
//!   instances. [`EscrowHost::call`] runs one operation under a per-instance
//!   non-reentrant guard, updates state before transferring, and restores
//!   the instance snapshot if the transfer fails.
//!
//! - **Transfer hooks** ([`transfer`]): a [`Recipient`] may refuse a payout,
//!   which fails the whole call.
//!
//! - **Notifications** ([`notify`]): committed transitions are published to
//!   an [`EventSink`]. Delivery is fire-and-forget.

pub mod config;
pub mod error;
pub mod host;
pub mod ledger;
pub mod notify;
pub mod transfer;

pub use config::HostConfig;
pub use error::HostError;
pub use host::{EscrowHost, Receipt};
pub use ledger::{Ledger, Settlement};
pub use notify::{EventSink, MemorySink, Notice, TracingSink};
pub use transfer::{AcceptAll, Recipient};
