use serde::{Deserialize, Serialize};

use crate::{Address, Amount, LoanId};

/// Notification emitted exactly once per successful triggering operation.
///
/// Observers (dashboards, indexers) consume these; the escrow never reads
/// them back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EscrowEvent {
    /// The owner published the borrowing terms; funding is open.
    Requesting { loan_id: LoanId, borrower: Address },
    /// The borrower paid back `amount` into custody.
    Repaid { loan_id: LoanId, amount: Amount },
    /// The loan was declared in default with `defaulted_amount` outstanding.
    Defaulted {
        loan_id: LoanId,
        borrower: Address,
        defaulted_amount: Amount,
        loan_amount: Amount,
    },
    Cancelled { loan_id: LoanId },
    /// Repayment was distributed to every lender.
    Closed { loan_id: LoanId },
}

impl EscrowEvent {
    pub fn loan_id(&self) -> LoanId {
        match self {
            EscrowEvent::Requesting { loan_id, .. }
            | EscrowEvent::Repaid { loan_id, .. }
            | EscrowEvent::Defaulted { loan_id, .. }
            | EscrowEvent::Cancelled { loan_id }
            | EscrowEvent::Closed { loan_id } => *loan_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EscrowEvent::Requesting { .. } => "Requesting",
            EscrowEvent::Repaid { .. } => "Repaid",
            EscrowEvent::Defaulted { .. } => "Defaulted",
            EscrowEvent::Cancelled { .. } => "Cancelled",
            EscrowEvent::Closed { .. } => "Closed",
        }
    }
}

impl std::fmt::Display for EscrowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowEvent::Requesting { loan_id, borrower } => {
                write!(f, "Requesting(loan={}, borrower={})", loan_id, borrower)
            }
            EscrowEvent::Repaid { loan_id, amount } => {
                write!(f, "Repaid(loan={}, amount={})", loan_id, amount)
            }
            EscrowEvent::Defaulted {
                loan_id,
                borrower,
                defaulted_amount,
                loan_amount,
            } => write!(
                f,
                "Defaulted(loan={}, borrower={}, defaulted={}, loan_amount={})",
                loan_id, borrower, defaulted_amount, loan_amount
            ),
            EscrowEvent::Cancelled { loan_id } => write!(f, "Cancelled(loan={})", loan_id),
            EscrowEvent::Closed { loan_id } => write!(f, "Closed(loan={})", loan_id),
        }
    }
}
