//! # Graph Subcommand
//!
//! Prints one row per operation: the role it requires, the state it starts
//! from and leaves behind, whether it accepts a deposit, and what it pays
//! out. The `from` column depends on the settlement rule.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use purchase_state::{Operation, PurchaseState, Role, SettlementRule};

/// Arguments for the `srp graph` subcommand.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Settlement rule to describe.
    #[arg(long, default_value_t = SettlementRule::default())]
    pub rule: SettlementRule,

    /// Emit JSON instead of a text table.
    #[arg(long)]
    pub json: bool,
}

/// One row of the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRow {
    /// Operation name.
    pub operation: Operation,
    /// Capability the caller needs.
    pub role: Role,
    /// Required state.
    pub from: PurchaseState,
    /// Resulting state.
    pub to: PurchaseState,
    /// Whether a deposit may be attached.
    pub payable: bool,
    /// Funds leaving custody on success.
    pub payout: &'static str,
}

/// The full transition table under `rule`.
pub fn transition_table(rule: SettlementRule) -> Vec<TransitionRow> {
    Operation::ALL
        .into_iter()
        .map(|op| TransitionRow {
            operation: op,
            role: op.required_role(),
            from: op.required_state(rule),
            to: op.target_state(),
            payable: op.is_payable(),
            payout: payout_label(op),
        })
        .collect()
}

fn payout_label(op: Operation) -> &'static str {
    match op {
        Operation::Abort => "custody -> seller",
        Operation::ConfirmPurchase => "-",
        Operation::ConfirmReceived => "value -> buyer",
        Operation::RefundSeller => "3 * value -> seller",
    }
}

/// Render the table as aligned text.
pub fn render_table(rule: SettlementRule, rows: &[TransitionRow]) -> String {
    let mut out = format!("settlement rule: {rule}\n");
    out.push_str(&format!(
        "{:<18} {:<7} {:<9} {:<9} {:<8} {}\n",
        "OPERATION", "ROLE", "FROM", "TO", "PAYABLE", "PAYOUT"
    ));
    for row in rows {
        out.push_str(&format!(
            "{:<18} {:<7} {:<9} {:<9} {:<8} {}\n",
            row.operation.as_str(),
            row.role.to_string(),
            row.from.as_str(),
            row.to.as_str(),
            if row.payable { "yes" } else { "no" },
            row.payout
        ));
    }
    out
}

/// Execute the graph subcommand.
pub fn run_graph(args: &GraphArgs) -> Result<u8> {
    let rows = transition_table(args.rule);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render_table(args.rule, &rows));
    }
    Ok(crate::EXIT_OK)
}
