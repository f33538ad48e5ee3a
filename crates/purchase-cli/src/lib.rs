//! # purchase-cli — CLI Tool for the Safe Remote Purchase
//!
//! Provides the `srp` command-line interface.
//!
//! ## Subcommands
//!
//! - `srp run` — Execute a scenario file against a fresh escrow host.
//! - `srp graph` — Print the transition table.
//!
//! ```bash
//! srp run scenarios/happy_path.yaml
//! srp run scenarios/observed_gap.yaml --rule release_then_refund
//! srp graph --rule as_observed
//! ```
//!
//! ## Exit Codes
//!
//! `0` when every expectation holds, `1` on an expectation mismatch, `2` on
//! an operational error (unreadable or malformed scenario).

pub mod graph;
pub mod scenario;

/// Every expectation held.
pub const EXIT_OK: u8 = 0;

/// At least one step did not produce its expected outcome.
pub const EXIT_MISMATCH: u8 = 1;

/// The scenario could not be executed.
pub const EXIT_OPERATIONAL: u8 = 2;
