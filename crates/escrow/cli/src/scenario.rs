//! Scenario files: wallets, loans and the steps replayed against them.
//!
//! ```yaml
//! name: refund after partial funding
//! wallets:
//!   - { name: alice, balance: 10 ether }
//!   - { name: bob, balance: 10 ether }
//! loans:
//!   - { name: main, owner: alice, policy: time_secured }
//! steps:
//!   - call: { loan: main, from: alice, op: request, borrower: bob, amount: 6 ether }
//!   - advance: 86400
//!   - call: { loan: main, from: bob, op: refund }
//!     expect_error: authorization
//! ```

use escrow_core::{Amount, Command, ErrorKind};
use serde::Deserialize;
use thiserror::Error;

use crate::config::PolicyKind;

/// Scenario loading and replay failures.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("unknown wallet '{0}'")]
    UnknownWallet(String),

    #[error("unknown loan '{0}'")]
    UnknownLoan(String),

    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    #[error("step {0} has nothing to do")]
    EmptyStep(usize),

    #[error("step {0} expects an error but makes no call")]
    ExpectationWithoutCall(usize),

    #[error("host failure: {0}")]
    Host(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,

    /// Unix seconds the clock starts at.
    #[serde(default)]
    pub start: Option<u64>,

    #[serde(default)]
    pub wallets: Vec<WalletSpec>,

    #[serde(default)]
    pub loans: Vec<LoanSpec>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletSpec {
    pub name: String,
    #[serde(default)]
    pub balance: Option<AmountText>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoanSpec {
    pub name: String,
    pub owner: String,
    /// Falls back to the configured policy.
    #[serde(default)]
    pub policy: Option<PolicyKind>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    /// Seconds to move the clock forward before the call.
    #[serde(default)]
    pub advance: Option<u64>,

    #[serde(default)]
    pub call: Option<CallSpec>,

    #[serde(default)]
    pub expect_error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallSpec {
    pub loan: String,
    pub from: String,
    /// Payment attached to the call.
    #[serde(default)]
    pub value: Option<AmountText>,
    #[serde(flatten)]
    pub op: OpSpec,
}

/// A lifecycle operation as written in a scenario, with wallet names and
/// amount strings not yet resolved.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpSpec {
    Request { borrower: String, amount: AmountText },
    DepositFund {
        #[serde(default)]
        rate: Option<AmountText>,
    },
    Refund,
    Cancel,
    WithdrawToBorrower,
    Repay,
    WithdrawToLenders,
    ToDefault,
    Recover,
    RefundAfterDefaulted,
}

impl OpSpec {
    /// Resolve into a [`Command`], looking wallet names up with `resolve`.
    pub fn to_command<F>(&self, resolve: F) -> Result<Command, ScenarioError>
    where
        F: Fn(&str) -> Result<escrow_core::Address, ScenarioError>,
    {
        Ok(match self {
            OpSpec::Request { borrower, amount } => Command::Request {
                borrower: resolve(borrower)?,
                amount: amount.amount()?,
            },
            OpSpec::DepositFund { rate } => Command::DepositFund {
                rate: match rate {
                    Some(rate) => rate.amount()?,
                    None => 0,
                },
            },
            OpSpec::Refund => Command::Refund,
            OpSpec::Cancel => Command::Cancel,
            OpSpec::WithdrawToBorrower => Command::WithdrawToBorrower,
            OpSpec::Repay => Command::Repay,
            OpSpec::WithdrawToLenders => Command::WithdrawToLenders,
            OpSpec::ToDefault => Command::ToDefault,
            OpSpec::Recover => Command::Recover,
            OpSpec::RefundAfterDefaulted => Command::RefundAfterDefaulted,
        })
    }
}

/// An amount written either as a bare integer of base units or as text
/// with an optional unit: `1500`, `"6 ether"`, `"0.5 eth"`, `"20 gwei"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AmountText {
    Units(u64),
    Text(String),
}

impl AmountText {
    pub fn amount(&self) -> Result<Amount, ScenarioError> {
        match self {
            AmountText::Units(units) => Ok(Amount::from(*units)),
            AmountText::Text(text) => parse_amount(text),
        }
    }
}

/// Parse `"<number> [unit]"` into base units.
pub fn parse_amount(text: &str) -> Result<Amount, ScenarioError> {
    let invalid = || ScenarioError::InvalidAmount(text.to_string());
    let mut parts = text.split_whitespace();
    let number = parts.next().ok_or_else(invalid)?;
    let decimals: u32 = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("wei") => 0,
        Some("gwei") => 9,
        Some("ether") | Some("eth") => 18,
        Some(_) => return Err(invalid()),
    };
    if parts.next().is_some() {
        return Err(invalid());
    }

    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (number, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > decimals as usize || !all_digits(whole) || !all_digits(frac) {
        return Err(invalid());
    }

    let scale = 10u128.pow(decimals);
    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac: Amount = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)
}

fn all_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_core::ether;

    #[test]
    fn test_parse_amount_units() {
        assert_eq!(parse_amount("6 ether").unwrap(), ether(6));
        assert_eq!(parse_amount("6 ETH").unwrap(), ether(6));
        assert_eq!(parse_amount("1.5 ether").unwrap(), ether(3) / 2);
        assert_eq!(parse_amount("20 gwei").unwrap(), 20_000_000_000);
        assert_eq!(parse_amount("1500").unwrap(), 1500);
        assert_eq!(parse_amount("7 wei").unwrap(), 7);
        assert_eq!(parse_amount(".25 ether").unwrap(), ether(1) / 4);
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        for text in ["", "ether", "1.5", "1 dollar", "-3 ether", "1 ether extra", "0.0000000000000000001 ether"] {
            assert!(parse_amount(text).is_err(), "accepted {:?}", text);
        }
    }

    #[test]
    fn test_scenario_parses() {
        let scenario = Scenario::from_yaml(
            r#"
name: sample
wallets:
  - { name: alice, balance: 10 ether }
  - { name: bob }
loans:
  - { name: main, owner: alice, policy: time_secured }
steps:
  - call: { loan: main, from: alice, op: request, borrower: bob, amount: 6 ether }
  - call: { loan: main, from: bob, op: deposit_fund, rate: 5, value: "2 ether" }
  - advance: 3600
  - call: { loan: main, from: bob, op: cancel }
    expect_error: state
"#,
        )
        .unwrap();

        assert_eq!(scenario.name.as_deref(), Some("sample"));
        assert_eq!(scenario.wallets.len(), 2);
        assert_eq!(scenario.loans[0].policy, Some(PolicyKind::TimeSecured));
        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(scenario.steps[2].advance, Some(3600));
        assert_eq!(scenario.steps[3].expect_error, Some(ErrorKind::State));

        let deposit = scenario.steps[1].call.as_ref().unwrap();
        assert_eq!(deposit.value, Some(AmountText::Text("2 ether".into())));
        let command = deposit
            .op
            .to_command(|_| Ok(escrow_core::Address::from_low_u64(1)))
            .unwrap();
        assert_eq!(command, Command::DepositFund { rate: 5 });
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let err = Scenario::from_yaml(
            "steps:\n  - call: { loan: main, from: alice, op: steal }\n",
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Parse(_)));
    }
}
