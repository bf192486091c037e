use escrow_ledger::FundLedger;
use escrow_types::{Address, Amount, LenderView, LoanId, LoanStatus, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{EscrowError, EscrowResult};
use crate::gate::{GateView, TimePolicy};

/// The persistent record of one loan: status, amounts, timestamps and the
/// lender ledger.
///
/// Created once in Requesting by its owner and mutated only through the
/// lifecycle operations; never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub id: LoanId,
    /// Creating authority.
    pub owner: Address,
    /// Zero until the loan is requested.
    pub borrower: Address,
    pub status: LoanStatus,
    pub requested_amount: Amount,
    pub ledger: FundLedger,
    pub time_policy: TimePolicy,
    pub created_at: Timestamp,
    pub fully_funded_at: Option<Timestamp>,
    pub withdrawn_at: Option<Timestamp>,
    pub repaid_at: Option<Timestamp>,
    /// Amount paid back by the borrower.
    pub repaid_amount: Amount,
    /// Funds paid into escrow after a default.
    pub recovered_amount: Amount,
}

impl EscrowAccount {
    pub fn new(id: LoanId, owner: Address, time_policy: TimePolicy, created_at: Timestamp) -> Self {
        Self {
            id,
            owner,
            borrower: Address::ZERO,
            status: LoanStatus::Requesting,
            requested_amount: 0,
            ledger: FundLedger::new(),
            time_policy,
            created_at,
            fully_funded_at: None,
            withdrawn_at: None,
            repaid_at: None,
            repaid_amount: 0,
            recovered_amount: 0,
        }
    }

    /// Principal owed to lenders (`ownedAmount`): contributions not yet
    /// refunded.
    pub fn owned_amount(&self) -> Amount {
        self.ledger.outstanding()
    }

    /// Room left before the requested amount is reached.
    pub fn remaining_capacity(&self) -> Amount {
        self.requested_amount
            .saturating_sub(self.ledger.total_contributed())
    }

    pub fn lender_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn lender_at(&self, index: usize) -> Option<LenderView> {
        self.ledger.lender_at(index).map(|p| p.view())
    }

    pub fn lender_by(&self, lender: &Address) -> Option<LenderView> {
        self.ledger.lender_by(lender).map(|p| p.view())
    }

    pub fn gate_view(&self) -> GateView {
        GateView {
            status: self.status,
            created_at: self.created_at,
            fully_funded_at: self.fully_funded_at,
            repaid_at: self.repaid_at,
        }
    }

    pub fn is_party(&self, who: &Address) -> bool {
        *who == self.owner || (!self.borrower.is_zero() && *who == self.borrower)
    }

    /// Check the structural invariants of the record.
    ///
    /// Violations are reported as `State` errors naming the broken rule.
    pub fn verify_invariants(&self) -> EscrowResult<()> {
        let contributed = self.ledger.total_contributed();

        if self.status == LoanStatus::Funding && contributed > self.requested_amount {
            return Err(EscrowError::State(format!(
                "funding account holds {} above the requested {}",
                contributed, self.requested_amount
            )));
        }

        if self.status.is_fully_funded() && self.owned_amount() != self.requested_amount {
            return Err(EscrowError::State(format!(
                "{} account owes {} but requested {}",
                self.status,
                self.owned_amount(),
                self.requested_amount
            )));
        }

        let requesting = self.status == LoanStatus::Requesting;
        let cancelled_early = self.status == LoanStatus::Cancelled && self.requested_amount == 0;
        if self.borrower.is_zero() != (requesting || cancelled_early) {
            return Err(EscrowError::State(format!(
                "borrower {} inconsistent with status {}",
                self.borrower, self.status
            )));
        }

        for p in self.ledger.iter() {
            if p.repaid > 0 && p.refunded > 0 {
                return Err(EscrowError::State(format!(
                    "lender {} paid through both repayment and refund",
                    p.lender
                )));
            }
        }

        Ok(())
    }
}
