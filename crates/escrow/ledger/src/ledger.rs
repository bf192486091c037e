use std::collections::HashMap;

use escrow_types::{Address, Amount, LenderView};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distribution::{distribute_proportionally, Payout};
use crate::error::LedgerError;
use crate::position::{LenderPosition, PayoutPath};

/// Insertion-ordered, address-keyed collection of lender positions.
///
/// Positions live in a `Vec` (serving `lender_at`) with an address → index
/// side table (serving `lender_by`). Each address appears at most once; a
/// repeat deposit merges into the existing position and keeps its original
/// place in the order.
///
/// Serialized as the plain ordered list of positions; the side table is
/// rebuilt on load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LenderPosition>", into = "Vec<LenderPosition>")]
pub struct FundLedger {
    positions: Vec<LenderPosition>,
    index: HashMap<Address, usize>,
}

impl FundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or merge a position; returns the new running total.
    ///
    /// The most recently proposed rate replaces any earlier one for the
    /// same lender. Nothing is mutated when an error is returned.
    pub fn add_contribution(
        &mut self,
        lender: Address,
        amount: Amount,
        proposed_rate: Amount,
    ) -> Result<Amount, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroContribution);
        }

        let current = self.total_contributed();
        let new_total = current
            .checked_add(amount)
            .ok_or(LedgerError::Overflow {
                current,
                added: amount,
            })?;

        match self.index.get(&lender) {
            Some(&i) => {
                let position = &mut self.positions[i];
                // bounded by new_total, which did not overflow
                position.contributed += amount;
                position.proposed_rate = proposed_rate;
            }
            None => {
                self.index.insert(lender, self.positions.len());
                self.positions
                    .push(LenderPosition::new(lender, amount, proposed_rate));
            }
        }

        debug!(
            lender = %lender,
            amount = amount,
            total = new_total,
            lenders = self.positions.len(),
            "Contribution recorded"
        );

        Ok(new_total)
    }

    /// Sum of every contribution ever accepted.
    pub fn total_contributed(&self) -> Amount {
        self.positions
            .iter()
            .fold(0, |acc: Amount, p| acc.saturating_add(p.contributed))
    }

    /// Principal still held for lenders: contributions minus refunds.
    pub fn outstanding(&self) -> Amount {
        self.positions
            .iter()
            .fold(0, |acc: Amount, p| acc.saturating_add(p.outstanding()))
    }

    pub fn total_repaid(&self) -> Amount {
        self.positions
            .iter()
            .fold(0, |acc: Amount, p| acc.saturating_add(p.repaid))
    }

    pub fn total_refunded(&self) -> Amount {
        self.positions
            .iter()
            .fold(0, |acc: Amount, p| acc.saturating_add(p.refunded))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn lender_at(&self, index: usize) -> Option<&LenderPosition> {
        self.positions.get(index)
    }

    pub fn lender_by(&self, lender: &Address) -> Option<&LenderPosition> {
        self.index.get(lender).map(|&i| &self.positions[i])
    }

    pub fn positions(&self) -> &[LenderPosition] {
        &self.positions
    }

    pub fn iter(&self) -> impl Iterator<Item = &LenderPosition> {
        self.positions.iter()
    }

    pub fn views(&self) -> Vec<LenderView> {
        self.positions.iter().map(LenderPosition::view).collect()
    }

    /// Proportional split of `pool` across all positions, weighted by
    /// contribution. See [`distribute_proportionally`].
    pub fn distribute(&self, pool: Amount) -> Result<Vec<Payout>, LedgerError> {
        distribute_proportionally(pool, &self.positions)
    }

    /// Payouts returning every lender's outstanding principal, skipping
    /// positions with nothing left to return.
    pub fn full_refund(&self) -> Vec<Payout> {
        self.positions
            .iter()
            .filter(|p| p.outstanding() > 0)
            .map(|p| Payout {
                lender: p.lender,
                amount: p.outstanding(),
            })
            .collect()
    }

    /// Record computed payouts against their positions.
    ///
    /// All payouts are validated before any is applied: an unknown lender
    /// or a position already paid through the other path rejects the whole
    /// batch. Zero-amount payouts are ignored.
    pub fn record_payouts(
        &mut self,
        payouts: &[Payout],
        path: PayoutPath,
    ) -> Result<(), LedgerError> {
        for payout in payouts.iter().filter(|p| p.amount > 0) {
            let i = *self
                .index
                .get(&payout.lender)
                .ok_or(LedgerError::UnknownLender(payout.lender))?;
            let position = &self.positions[i];
            if let Some(existing) = position.payout_path() {
                if existing != path {
                    return Err(LedgerError::AlreadySettled {
                        lender: payout.lender,
                        existing,
                        attempted: path,
                    });
                }
            }
            let already = match path {
                PayoutPath::Repayment => position.repaid,
                PayoutPath::Refund => position.refunded,
            };
            if already.checked_add(payout.amount).is_none() {
                return Err(LedgerError::Overflow {
                    current: already,
                    added: payout.amount,
                });
            }
        }

        for payout in payouts.iter().filter(|p| p.amount > 0) {
            let i = self.index[&payout.lender];
            let position = &mut self.positions[i];
            match path {
                PayoutPath::Repayment => position.repaid += payout.amount,
                PayoutPath::Refund => position.refunded += payout.amount,
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<LenderPosition>> for FundLedger {
    type Error = LedgerError;

    fn try_from(positions: Vec<LenderPosition>) -> Result<Self, Self::Error> {
        let mut index = HashMap::with_capacity(positions.len());
        for (i, p) in positions.iter().enumerate() {
            if index.insert(p.lender, i).is_some() {
                return Err(LedgerError::DuplicateLender(p.lender));
            }
        }
        Ok(Self { positions, index })
    }
}

impl From<FundLedger> for Vec<LenderPosition> {
    fn from(ledger: FundLedger) -> Self {
        ledger.positions
    }
}
