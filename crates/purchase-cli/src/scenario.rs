//! # Run Subcommand
//!
//! Executes a YAML scenario against a fresh [`EscrowHost`] and prints a JSON
//! report.
//!
//! ## Scenario Format
//!
//! ```yaml
//! config:
//!   settlement_rule: release_then_refund
//! wallets:
//!   seller: 100
//!   buyer: 100
//! steps:
//!   - { caller: seller, action: create, amount: 10 }
//!   - { caller: buyer, action: confirm_purchase, amount: 10, expect: ok }
//!   - { caller: seller, action: confirm_received, expect: unauthorized }
//! ```
//!
//! `escrow` selects an instance by creation order and defaults to the most
//! recently created one. A step without `expect` is recorded but not
//! checked.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use purchase_core::{Amount, EscrowId, Principal};
use purchase_custody::{EscrowHost, HostConfig, HostError, MemorySink, Notice};
use purchase_state::{FailureKind, Operation, Payout, PurchaseState, SettlementRule};

/// Arguments for the `srp run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the scenario YAML file.
    #[arg(value_name = "SCENARIO")]
    pub scenario: PathBuf,

    /// Override the scenario's settlement rule.
    #[arg(long)]
    pub rule: Option<SettlementRule>,
}

// ─── Scenario Model ──────────────────────────────────────────────────

/// A scripted sequence of escrow calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Host configuration.
    #[serde(default)]
    pub config: HostConfig,
    /// Initial wallet balances.
    #[serde(default)]
    pub wallets: BTreeMap<Principal, Amount>,
    /// Calls to make, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scripted call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Who makes the call.
    pub caller: Principal,
    /// What the call does.
    pub action: Action,
    /// Attached amount; the deposit for `create`.
    #[serde(default)]
    pub amount: Amount,
    /// Index of the target escrow in creation order.
    #[serde(default)]
    pub escrow: Option<usize>,
    /// Expected outcome.
    #[serde(default)]
    pub expect: Option<Expectation>,
}

/// A scripted action: deploying an escrow or calling one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Deploy a new escrow with `amount` as the seller's deposit.
    Create,
    /// [`Operation::Abort`].
    Abort,
    /// [`Operation::ConfirmPurchase`].
    ConfirmPurchase,
    /// [`Operation::ConfirmReceived`].
    ConfirmReceived,
    /// [`Operation::RefundSeller`].
    RefundSeller,
}

impl Action {
    /// The escrow operation this action calls, if it is not a deployment.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Create => None,
            Self::Abort => Some(Operation::Abort),
            Self::ConfirmPurchase => Some(Operation::ConfirmPurchase),
            Self::ConfirmReceived => Some(Operation::ConfirmReceived),
            Self::RefundSeller => Some(Operation::RefundSeller),
        }
    }
}

/// Outcome classes a step can expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// The call committed.
    Ok,
    /// Wrong role.
    Unauthorized,
    /// Wrong state.
    InvalidState,
    /// Wrong attached amount or deposit.
    InvalidAmount,
    /// Caller's wallet too small.
    InsufficientFunds,
    /// Custody too small for the payout.
    InsufficientCustody,
    /// Recipient refused the payout.
    TransferRejected,
    /// Any failure.
    Rejected,
}

impl Expectation {
    /// Classify a host failure.
    pub fn of_error(err: &HostError) -> Self {
        if let Some(kind) = err.escrow_kind() {
            return match kind {
                FailureKind::Unauthorized => Self::Unauthorized,
                FailureKind::InvalidState => Self::InvalidState,
                FailureKind::InvalidAmount => Self::InvalidAmount,
            };
        }
        match err {
            HostError::InsufficientFunds { .. } => Self::InsufficientFunds,
            HostError::InsufficientCustody { .. } => Self::InsufficientCustody,
            HostError::TransferRejected { .. } => Self::TransferRejected,
            _ => Self::Rejected,
        }
    }

    /// Whether an observed outcome satisfies this expectation.
    pub fn matches(&self, observed: Expectation) -> bool {
        match self {
            Self::Rejected => observed != Self::Ok,
            other => *other == observed,
        }
    }
}

// ─── Report ──────────────────────────────────────────────────────────

/// What one step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Position in the scenario.
    pub index: usize,
    /// Who called.
    pub caller: Principal,
    /// What was called.
    pub action: Action,
    /// Attached amount.
    pub amount: Amount,
    /// Target escrow; absent for a failed deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow: Option<EscrowId>,
    /// Observed outcome class.
    pub outcome: Expectation,
    /// Failure message, when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Funds paid out by the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<Payout>,
    /// Expected outcome, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expectation>,
    /// Whether the expectation held (true when there was none).
    pub matched: bool,
}

/// Final state of one escrow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscrowSummary {
    /// Instance identifier.
    pub id: EscrowId,
    /// Current state.
    pub state: PurchaseState,
    /// Item value.
    pub value: Amount,
    /// The seller.
    pub seller: Principal,
    /// The buyer, if any.
    pub buyer: Option<Principal>,
    /// Custodied balance.
    pub custody: Amount,
    /// Whether the seller's final payout was made.
    pub seller_refunded: bool,
}

/// Everything a scenario run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Rule the host ran under.
    pub settlement_rule: SettlementRule,
    /// One entry per step.
    pub steps: Vec<StepReport>,
    /// Published notifications, in order.
    pub notices: Vec<Notice>,
    /// Final wallet balances.
    pub wallets: BTreeMap<Principal, Amount>,
    /// Final instance summaries, in creation order.
    pub escrows: Vec<EscrowSummary>,
    /// Whether every expectation held.
    pub passed: bool,
}

// ─── Execution ───────────────────────────────────────────────────────

/// Parse a scenario from YAML text.
pub fn parse_scenario(text: &str) -> Result<Scenario> {
    serde_yaml::from_str(text).context("failed to parse scenario YAML")
}

/// Read and parse a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    if !path.exists() {
        bail!("scenario file not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
    parse_scenario(&text).with_context(|| format!("in {}", path.display()))
}

/// Run `scenario` against a fresh host.
///
/// Guard and custody failures of individual steps are part of the report.
/// Only a malformed scenario (an escrow index that does not exist, or
/// wallet funding that overflows) is an error.
pub fn execute(scenario: &Scenario, rule: Option<SettlementRule>) -> Result<ScenarioReport> {
    let mut config = scenario.config.clone();
    if let Some(rule) = rule {
        config.settlement_rule = rule;
    }

    let sink = Arc::new(MemorySink::new());
    let host = EscrowHost::new(config).with_sink(Arc::clone(&sink));
    for (principal, amount) in &scenario.wallets {
        host.fund(principal, *amount)
            .with_context(|| format!("failed to fund wallet {principal}"))?;
    }

    let mut deployed: Vec<EscrowId> = Vec::new();
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let (escrow, result) = match step.action.operation() {
            None => match host.deploy(&step.caller, step.amount) {
                Ok(id) => {
                    deployed.push(id);
                    (Some(id), Ok(None))
                }
                Err(e) => (None, Err(e)),
            },
            Some(op) => {
                let id = target(&deployed, step.escrow, index)?;
                let result = host
                    .call(id, &step.caller, step.amount, op)
                    .map(|receipt| receipt.payout);
                (Some(id), result)
            }
        };

        let (outcome, error, payout) = match result {
            Ok(payout) => (Expectation::Ok, None, payout),
            Err(e) => (Expectation::of_error(&e), Some(e.to_string()), None),
        };
        let matched = step.expect.map_or(true, |exp| exp.matches(outcome));
        if !matched {
            tracing::warn!(
                step = index,
                action = ?step.action,
                ?outcome,
                expected = ?step.expect,
                "expectation failed"
            );
        }

        steps.push(StepReport {
            index,
            caller: step.caller.clone(),
            action: step.action,
            amount: step.amount,
            escrow,
            outcome,
            error,
            payout,
            expected: step.expect,
            matched,
        });
    }

    let mut escrows = Vec::with_capacity(deployed.len());
    for id in &deployed {
        let escrow = host.escrow(*id)?;
        escrows.push(EscrowSummary {
            id: *id,
            state: escrow.state(),
            value: escrow.value(),
            seller: escrow.seller().clone(),
            buyer: escrow.buyer().cloned(),
            custody: host.custody_of(*id),
            seller_refunded: escrow.seller_refunded(),
        });
    }

    let passed = steps.iter().all(|s| s.matched);
    Ok(ScenarioReport {
        settlement_rule: host.config().settlement_rule,
        steps,
        notices: sink.notices(),
        wallets: host.ledger().wallets().clone(),
        escrows,
        passed,
    })
}

fn target(deployed: &[EscrowId], selector: Option<usize>, step: usize) -> Result<EscrowId> {
    let index = match selector {
        Some(i) => i,
        None => match deployed.len().checked_sub(1) {
            Some(last) => last,
            None => bail!("step {step}: no escrow has been created yet"),
        },
    };
    match deployed.get(index) {
        Some(id) => Ok(*id),
        None => bail!(
            "step {step}: escrow index {index} out of range ({} created)",
            deployed.len()
        ),
    }
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 if every expectation held, 1 otherwise.
pub fn run_scenario(args: &RunArgs) -> Result<u8> {
    let scenario = load_scenario(&args.scenario)?;
    tracing::info!(
        scenario = %args.scenario.display(),
        steps = scenario.steps.len(),
        "running scenario"
    );
    let report = execute(&scenario, args.rule)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.passed {
        Ok(crate::EXIT_OK)
    } else {
        Ok(crate::EXIT_MISMATCH)
    }
}
