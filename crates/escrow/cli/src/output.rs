//! Rendering of replay reports.

use escrow_types::format_amount;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::runner::{Outcome, RunReport, StepReport};

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Step log followed by loan and wallet tables
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Table row for lender display
#[derive(Debug, Serialize, Tabled)]
struct LenderRow {
    #[tabled(rename = "#")]
    index: usize,
    address: String,
    contributed: String,
    repaid: String,
    refunded: String,
    rate: String,
}

/// Table row for wallet display
#[derive(Debug, Serialize, Tabled)]
struct WalletRow {
    name: String,
    address: String,
    balance: String,
}

pub fn render(report: &RunReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report),
        OutputFormat::Table => Ok(render_text(report)),
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    if let Some(name) = &report.scenario {
        out.push_str(&format!("Scenario: {}\n\n", name));
    }

    for step in &report.steps {
        out.push_str(&step_line(step));
        for event in &step.events {
            out.push_str(&format!("      -> {}\n", event));
        }
    }

    for loan in &report.loans {
        let info = &loan.info;
        out.push_str(&format!("\nLoan {} ({})\n", loan.name, loan.id));
        out.push_str(&format!("  status:    {}\n", info.status));
        out.push_str(&format!("  owner:     {}\n", info.owner));
        out.push_str(&format!("  borrower:  {}\n", info.borrower));
        out.push_str(&format!("  amount:    {} ETH\n", format_amount(info.loan_amount)));
        out.push_str(&format!("  balance:   {} ETH\n", format_amount(loan.balance)));
        let due = info
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("  due:       {}\n", due));
        out.push_str(&format!("  lenders:   {}\n", info.lender_count));

        if !loan.lenders.is_empty() {
            let rows: Vec<LenderRow> = loan
                .lenders
                .iter()
                .enumerate()
                .map(|(index, l)| LenderRow {
                    index,
                    address: l.address.to_string(),
                    contributed: format_amount(l.contributed_amount),
                    repaid: format_amount(l.repaid_amount),
                    refunded: format_amount(l.refunded_amount),
                    rate: l.proposed_rate.to_string(),
                })
                .collect();
            out.push_str(&Table::new(rows).to_string());
            out.push('\n');
        }
    }

    if !report.wallets.is_empty() {
        let rows: Vec<WalletRow> = report
            .wallets
            .iter()
            .map(|w| WalletRow {
                name: w.name.clone(),
                address: w.address.to_string(),
                balance: format_amount(w.balance),
            })
            .collect();
        out.push_str("\nWallets (ETH)\n");
        out.push_str(&Table::new(rows).to_string());
        out.push('\n');
    }

    out.push_str(&format!(
        "\n{} steps, {} mismatched\n",
        report.steps.len(),
        report.mismatches()
    ));
    out
}

fn step_line(step: &StepReport) -> String {
    let result = match &step.outcome {
        Outcome::Ok => "ok".to_string(),
        Outcome::Rejected { kind, reason } => format!("rejected ({}): {}", kind, reason),
    };
    let flag = if step.matched { "" } else { "  [UNEXPECTED]" };
    let expected = match step.expected {
        Some(kind) if step.matched => format!("  [expected {}]", kind),
        Some(kind) => format!("  [wanted {}]", kind),
        None => String::new(),
    };
    format!("  #{:<3} {} ... {}{}{}\n", step.index, step.action, result, expected, flag)
}
