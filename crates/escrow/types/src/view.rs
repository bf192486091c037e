use serde::{Deserialize, Serialize};

use crate::{Address, Amount, LoanStatus, Timestamp};

/// Read-only view of one lender position, as returned by
/// `lenderAt(index)` and `lenderBy(address)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderView {
    pub address: Address,
    pub contributed_amount: Amount,
    pub repaid_amount: Amount,
    pub refunded_amount: Amount,
    pub proposed_rate: Amount,
}

/// Aggregate snapshot of one loan for dashboards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanInfo {
    pub owner: Address,
    pub borrower: Address,
    pub loan_amount: Amount,
    pub status: LoanStatus,
    pub lender_count: usize,
    /// Agreed repayment date; unknown until the loan is fully funded.
    pub due_date: Option<Timestamp>,
    pub now: Timestamp,
}

impl LoanInfo {
    /// Whether the due date has passed while the borrower still holds the funds.
    pub fn is_overdue(&self) -> bool {
        self.status == LoanStatus::FundWithdrawn
            && self.due_date.is_some_and(|due| self.now >= due)
    }
}
