use escrow_types::{Address, Amount, LenderView};
use serde::{Deserialize, Serialize};

/// Which terminal path paid a position out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutPath {
    /// Principal returned after a successful repayment.
    Repayment,
    /// Contribution returned by refund (before withdrawal or after default).
    Refund,
}

/// One lender's running record within a loan.
///
/// A position is paid out through exactly one terminal path: `repaid` and
/// `refunded` are never both non-zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderPosition {
    pub lender: Address,
    pub contributed: Amount,
    /// Rate proposed with the most recent deposit, in base units per whole unit.
    pub proposed_rate: Amount,
    pub repaid: Amount,
    pub refunded: Amount,
}

impl LenderPosition {
    pub fn new(lender: Address, contributed: Amount, proposed_rate: Amount) -> Self {
        Self {
            lender,
            contributed,
            proposed_rate,
            repaid: 0,
            refunded: 0,
        }
    }

    /// Principal still held in escrow on this lender's behalf.
    pub fn outstanding(&self) -> Amount {
        self.contributed.saturating_sub(self.refunded)
    }

    /// The path this position was paid out through, if any.
    pub fn payout_path(&self) -> Option<PayoutPath> {
        if self.repaid > 0 {
            Some(PayoutPath::Repayment)
        } else if self.refunded > 0 {
            Some(PayoutPath::Refund)
        } else {
            None
        }
    }

    pub fn view(&self) -> LenderView {
        LenderView {
            address: self.lender,
            contributed_amount: self.contributed,
            repaid_amount: self.repaid,
            refunded_amount: self.refunded,
            proposed_rate: self.proposed_rate,
        }
    }
}
