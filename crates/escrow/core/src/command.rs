use escrow_types::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Who is calling, and what value is attached to the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub caller: Address,
    #[serde(default)]
    pub value: Amount,
}

impl Call {
    pub fn new(caller: Address) -> Self {
        Self { caller, value: 0 }
    }

    /// Attach a payment to the call.
    pub fn paying(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

/// The mutating command surface of an escrow account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Request { borrower: Address, amount: Amount },
    DepositFund { rate: Amount },
    Refund,
    Cancel,
    WithdrawToBorrower,
    Repay,
    WithdrawToLenders,
    ToDefault,
    /// Pay recovered funds into a defaulted loan's escrow.
    Recover,
    RefundAfterDefaulted,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Request { .. } => "request",
            Command::DepositFund { .. } => "deposit_fund",
            Command::Refund => "refund",
            Command::Cancel => "cancel",
            Command::WithdrawToBorrower => "withdraw_to_borrower",
            Command::Repay => "repay",
            Command::WithdrawToLenders => "withdraw_to_lenders",
            Command::ToDefault => "to_default",
            Command::Recover => "recover",
            Command::RefundAfterDefaulted => "refund_after_defaulted",
        }
    }

    /// Whether the command accepts an attached payment.
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            Command::DepositFund { .. } | Command::Repay | Command::Recover
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_value_carrying_commands_are_payable() {
        assert!(Command::DepositFund { rate: 0 }.is_payable());
        assert!(Command::Repay.is_payable());
        assert!(Command::Recover.is_payable());
        assert!(!Command::Refund.is_payable());
        assert!(!Command::WithdrawToLenders.is_payable());
    }

    #[test]
    fn command_serialization_uses_op_tag() {
        let json = serde_json::to_string(&Command::WithdrawToBorrower).unwrap();
        assert_eq!(json, r#"{"op":"withdraw_to_borrower"}"#);
        let cmd: Command = serde_json::from_str(r#"{"op":"deposit_fund","rate":3}"#).unwrap();
        assert_eq!(cmd, Command::DepositFund { rate: 3 });
    }

    #[test]
    fn paying_attaches_value() {
        let call = Call::new(Address::from_low_u64(1)).paying(9);
        assert_eq!(call.value, 9);
    }
}
